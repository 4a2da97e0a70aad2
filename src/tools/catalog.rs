//! Lazily-initialized tool catalog shared by the reasoner and the gate.
//!
//! The catalog owns the built-in tools and, on first use, discovers whatever
//! the configured tool servers expose. Discovery runs at most once per
//! process: the first caller performs it and concurrent callers await the
//! same result. When discovery fails the catalog degrades to the built-in
//! set instead of failing the conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::ToolServerConfig;

use super::remote::{self, ToolServer};
use super::{Tool, ToolRegistry, ToolSpec, WeatherTool};

/// Upper bound on spawning and listing one tool server. Applies to discovery
/// only; tool invocation itself carries no internal timeout.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of remotely-discovered tools.
#[async_trait]
pub trait ToolDiscovery: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>>;
}

pub struct ToolCatalog {
    builtin: Vec<Arc<dyn Tool>>,
    discovery: Option<Arc<dyn ToolDiscovery>>,
    full: OnceCell<ToolRegistry>,
}

impl ToolCatalog {
    pub fn new(builtin: Vec<Arc<dyn Tool>>, discovery: Option<Arc<dyn ToolDiscovery>>) -> Self {
        Self {
            builtin,
            discovery,
            full: OnceCell::new(),
        }
    }

    /// Standard catalog: the built-in weather tool plus whatever the
    /// configured servers expose.
    pub fn with_defaults(servers: Vec<ToolServerConfig>) -> Self {
        let discovery: Option<Arc<dyn ToolDiscovery>> = if servers.is_empty() {
            None
        } else {
            Some(Arc::new(RemoteServers::new(servers)))
        };
        Self::new(vec![Arc::new(WeatherTool)], discovery)
    }

    async fn registry(&self) -> &ToolRegistry {
        self.full
            .get_or_init(|| async {
                let mut registry = ToolRegistry::new();
                for tool in &self.builtin {
                    registry.register(tool.clone());
                }

                if let Some(discovery) = &self.discovery {
                    match discovery.discover().await {
                        Ok(tools) => {
                            info!(count = tools.len(), "Discovered remote tools");
                            for tool in tools {
                                registry.register(tool);
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Remote tool discovery failed, continuing with built-ins only: {}",
                                e
                            );
                        }
                    }
                }

                registry
            })
            .await
    }

    /// Look up a capability by name.
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry().await.get(name)
    }

    /// Descriptors of every available capability.
    pub async fn specs(&self) -> Vec<ToolSpec> {
        self.registry().await.specs()
    }

    /// Chat-completions schemas for every available capability.
    pub async fn schemas(&self) -> Vec<Value> {
        self.specs().await.iter().map(ToolSpec::to_schema).collect()
    }
}

/// Production discovery: spawn each configured server, list its tools, and
/// wrap them in the adapter their descriptor asks for.
pub struct RemoteServers {
    configs: Vec<ToolServerConfig>,
}

impl RemoteServers {
    pub fn new(configs: Vec<ToolServerConfig>) -> Self {
        Self { configs }
    }
}

#[async_trait]
impl ToolDiscovery for RemoteServers {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let mut failures = 0usize;

        for config in &self.configs {
            match tokio::time::timeout(DISCOVERY_TIMEOUT, discover_one(config)).await {
                Ok(Ok(mut found)) => {
                    info!(server = %config.name, count = found.len(), "Tool server discovered");
                    tools.append(&mut found);
                }
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(server = %config.name, "Tool server discovery failed: {}", e);
                }
                Err(_) => {
                    failures += 1;
                    warn!(server = %config.name, "Tool server discovery timed out");
                }
            }
        }

        if tools.is_empty() && failures > 0 {
            anyhow::bail!("all {} configured tool servers failed discovery", failures);
        }
        Ok(tools)
    }
}

async fn discover_one(config: &ToolServerConfig) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
    let server = ToolServer::spawn(config).await?;
    let infos = server.list_tools().await?;
    Ok(infos
        .into_iter()
        .map(|info| remote::into_tool(server.clone(), info))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "static test tool"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _args: Value) -> anyhow::Result<String> {
            Ok(format!("{} ran", self.name))
        }
    }

    struct CountingDiscovery {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolDiscovery for CountingDiscovery {
        async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Arc::new(StaticTool {
                name: "tavily-search",
            })])
        }
    }

    struct FailingDiscovery;

    #[async_trait]
    impl ToolDiscovery for FailingDiscovery {
        async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
            anyhow::bail!("remote side unavailable")
        }
    }

    #[tokio::test]
    async fn discovery_runs_once_across_repeated_resolution() {
        let discovery = Arc::new(CountingDiscovery {
            calls: AtomicUsize::new(0),
        });
        let catalog = ToolCatalog::new(
            vec![Arc::new(StaticTool { name: "get_weather" })],
            Some(discovery.clone()),
        );

        // Concurrent first use: both callers await the same initialization.
        let (a, b) = tokio::join!(catalog.specs(), catalog.specs());
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);

        assert!(catalog.resolve("tavily-search").await.is_some());
        assert!(catalog.resolve("get_weather").await.is_some());
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_discovery_degrades_to_builtins() {
        let catalog = ToolCatalog::new(
            vec![Arc::new(StaticTool { name: "get_weather" })],
            Some(Arc::new(FailingDiscovery)),
        );

        let specs = catalog.specs().await;
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "get_weather");

        assert!(catalog.resolve("get_weather").await.is_some());
        assert!(catalog.resolve("tavily-search").await.is_none());
    }

    #[tokio::test]
    async fn catalog_without_discovery_serves_builtins() {
        let catalog = ToolCatalog::new(vec![Arc::new(StaticTool { name: "get_weather" })], None);
        let schemas = catalog.schemas().await;
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["function"]["name"], "get_weather");
    }
}
