//! Model client boundary: chat wire types and the `ChatClient` trait.

mod openai;

pub use openai::OpenAiCompatClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Message roles in the chat wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool call proposed by the model.
///
/// `arguments` is the raw JSON string as the wire format carries it; it is
/// parsed only at invocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,

    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Parse the argument string into a JSON value. Unparseable arguments
    /// degrade to `null` and are left to the tool to reject.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        serde_json::from_str(&self.function.arguments).unwrap_or(serde_json::Value::Null)
    }
}

/// One turn in a conversation, in the chat-completions wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool-result turn correlated to the call that produced it.
    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// What the model returned for one completion.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Boundary to the language model.
///
/// Implementations must pass the tool schemas through with parallel tool
/// calls disabled; the agent relies on single-proposal turns.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ChatResponse, LlmError>;
}
