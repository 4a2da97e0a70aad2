//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{ApprovalRequest, SearchRecord};
use crate::api::session_store::SessionState;
use crate::llm::{ChatMessage, ToolCall};
use crate::tools::ToolSpec;

/// Response after creating a session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    /// Unique session identifier
    pub id: Uuid,

    /// Current session state
    pub state: SessionState,
}

/// Request to send a user message into a session.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    /// The user's message text
    pub content: String,

    /// Actions the calling surface executes itself. These are offered to the
    /// model alongside catalog tools but never invoked server-side.
    #[serde(default)]
    pub host_actions: Vec<ToolSpec>,
}

/// Request to resolve a pending approval.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    /// The raw decision text. Recognized values: "approve", "approved",
    /// "reject", "rejected". Anything else is a 400 and the session is
    /// left untouched.
    pub decision: String,

    /// Host action descriptors, re-sent so the continued pass can still
    /// offer them to the model.
    #[serde(default)]
    pub host_actions: Vec<ToolSpec>,
}

/// Request to report the result of a host-executed action.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResultRequest {
    /// Identifier of the call being answered; must match the pending call.
    pub call_id: String,

    /// The action's result, fed back to the model as a tool turn.
    pub result: String,

    #[serde(default)]
    pub host_actions: Vec<ToolSpec>,
}

/// Outcome of one pass through the agent loop.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    /// Session identifier
    pub session_id: Uuid,

    /// Session state after the pass
    pub state: SessionState,

    /// Final assistant answer, present when the pass completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Suspension payload, present when the pass stopped for approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<ApprovalRequest>,

    /// Proposed host action, present when the caller must execute it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_action: Option<HostActionView>,
}

/// A host action handed back to the calling surface.
#[derive(Debug, Clone, Serialize)]
pub struct HostActionView {
    /// Call identifier to echo back in the action result
    pub call_id: String,

    /// Name of the action
    pub name: String,

    /// Parsed arguments
    pub arguments: Value,
}

impl HostActionView {
    pub fn from_call(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.parsed_arguments(),
        }
    }
}

/// Full session state returned by GET.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Unique session identifier
    pub id: Uuid,

    /// Current state
    pub state: SessionState,

    /// Full message transcript
    pub messages: Vec<ChatMessage>,

    /// Search bookkeeping for the session
    pub search_history: Vec<SearchRecord>,

    /// Pending approval payload, present while suspended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<ApprovalRequest>,

    /// Creation timestamp (ISO 8601)
    pub created_at: String,

    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
}

/// Compact session listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Unique session identifier
    pub id: Uuid,

    /// Current state
    pub state: SessionState,

    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
