//! Configuration management for toolgate.
//!
//! Configuration can be set via environment variables:
//! - `DASHSCOPE_API_KEY` - Required. API key for the OpenAI-compatible model endpoint.
//! - `MODEL_API_BASE` - Optional. Base URL of the chat-completions endpoint.
//!   Defaults to the DashScope compatible-mode endpoint.
//! - `DEFAULT_MODEL` - Optional. The default model to use. Defaults to `qwen-plus`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `MAX_ITERATIONS` - Optional. Maximum reasoner/gate cycles per pass. Defaults to `50`.
//! - `SESSION_STORE_TYPE` - Optional. `sqlite` or `memory`. Defaults to `sqlite`.
//! - `SESSION_DB_PATH` - Optional. SQLite file path. Defaults to `.toolgate/sessions.db`.
//! - `TOOLS_CONFIG` - Optional. Path to the tool-server YAML file. Defaults to `tools.yaml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which backing implementation the session store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreKind {
    Sqlite,
    Memory,
}

/// One remote tool-server process the catalog may discover tools from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolServerConfig {
    /// Display name used in logs.
    pub name: String,

    /// Executable to spawn.
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ToolsFile {
    #[serde(default)]
    servers: Vec<ToolServerConfig>,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the model endpoint
    pub api_key: String,

    /// Base URL of the OpenAI-compatible chat API
    pub api_base: String,

    /// Default model identifier
    pub default_model: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum reasoner/gate cycles for one conversation pass
    pub max_iterations: usize,

    /// Session store backend
    pub store_kind: SessionStoreKind,

    /// SQLite database path (used when `store_kind` is `Sqlite`)
    pub session_db_path: PathBuf,

    /// Path to the tool-server YAML config
    pub tools_config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `DASHSCOPE_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("DASHSCOPE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("DASHSCOPE_API_KEY".to_string()))?;

        let api_base = std::env::var("MODEL_API_BASE")
            .unwrap_or_else(|_| "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string());

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "qwen-plus".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let max_iterations = std::env::var("MAX_ITERATIONS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("MAX_ITERATIONS".to_string(), format!("{}", e))
            })?;

        let store_kind = match std::env::var("SESSION_STORE_TYPE")
            .unwrap_or_else(|_| "sqlite".to_string())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "sqlite" => SessionStoreKind::Sqlite,
            "memory" => SessionStoreKind::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SESSION_STORE_TYPE".to_string(),
                    format!("expected 'sqlite' or 'memory', got: {}", other),
                ))
            }
        };

        let session_db_path = std::env::var("SESSION_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".toolgate/sessions.db"));

        let tools_config_path = std::env::var("TOOLS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("tools.yaml"));

        Ok(Self {
            api_key,
            api_base,
            default_model,
            host,
            port,
            max_iterations,
            store_kind,
            session_db_path,
            tools_config_path,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, api_base: String, default_model: String) -> Self {
        Self {
            api_key,
            api_base,
            default_model,
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_iterations: 50,
            store_kind: SessionStoreKind::Memory,
            session_db_path: PathBuf::from(".toolgate/sessions.db"),
            tools_config_path: PathBuf::from("tools.yaml"),
        }
    }
}

/// Load the tool-server list from a YAML file.
///
/// A missing file is not an error: it simply means no remote servers are
/// configured and the catalog runs on built-ins only.
pub fn load_tool_servers(path: &Path) -> Result<Vec<ToolServerConfig>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InvalidValue(path.display().to_string(), format!("read failed: {}", e))
    })?;

    let file: ToolsFile = serde_yaml::from_str(&raw).map_err(|e| {
        ConfigError::InvalidValue(path.display().to_string(), format!("parse failed: {}", e))
    })?;

    Ok(file.servers)
}
