//! Action gate: the suspend → decide → execute → report cycle for exactly
//! one proposed tool call.
//!
//! The gate never waits in-process. Suspension means the conversation is
//! persisted with the proposal at its tail and an [`ApprovalRequest`] handed
//! to the caller; the decision re-enters through [`ActionGate::resume`],
//! arbitrarily later. Every decided proposal folds exactly one tool-result
//! turn back into the history, correlated by call id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::ChatMessage;
use crate::tools::{invoke_guarded, ToolCatalog};

use super::state::{is_search_tool, Conversation};

/// Result turn content for a declined call.
const REJECTION_NOTICE: &str = "Tool call was declined by the user.";

/// Payload handed to the external decision source while suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub tool_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRequest {
    pub const KIND: &'static str = "tool_approval_request";

    /// Shape the suspension payload for one proposed call.
    pub fn for_call(call: &crate::llm::ToolCall) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            tool_name: call.function.name.clone(),
            tool_args: call.parsed_arguments(),
            tool_id: call.id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A recognized approval verdict.
///
/// Exactly four spellings are accepted; anything else is the unrecognized-
/// decision condition and must not reach the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approve" | "approved" => Some(Self::Approved),
            "reject" | "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// What resuming the gate did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Exactly one result turn was appended; the cycle continues.
    Reported,

    /// Nothing was pending. The conversation is untouched and control goes
    /// back to the reasoner (guards against re-entry with stale state).
    NoPending,
}

/// The gate itself is stateless; all state lives in the conversation, which
/// is what makes suspension a plain persistence concern.
pub struct ActionGate;

impl ActionGate {
    /// Derive the approval request for the live proposal, if any. `None`
    /// means there is nothing to suspend on.
    pub fn suspension_request(&self, conversation: &Conversation) -> Option<ApprovalRequest> {
        conversation.pending_call().map(ApprovalRequest::for_call)
    }

    /// Re-enter the gate with a decision for the pending proposal.
    ///
    /// All execution failures are folded into the result turn: an unknown
    /// name, a failing tool, and a panicking tool all report instead of
    /// erroring, so the conversation always stays resumable.
    pub async fn resume(
        &self,
        conversation: &mut Conversation,
        decision: Decision,
        catalog: &ToolCatalog,
    ) -> GateOutcome {
        let Some(call) = conversation.pending_call().cloned() else {
            return GateOutcome::NoPending;
        };
        let tool_name = call.function.name.clone();

        match decision {
            Decision::Rejected => {
                info!(tool = %tool_name, call_id = %call.id, "Tool call rejected");
                // A rejected search leaves its record pending; records are
                // only ever bulk-cleared at the end of the conversation.
                conversation.push(ChatMessage::tool_result(REJECTION_NOTICE, &call.id));
            }
            Decision::Approved => {
                info!(tool = %tool_name, call_id = %call.id, "Tool call approved");
                let content = match catalog.resolve(&tool_name).await {
                    None => {
                        warn!(tool = %tool_name, "Approved call names an unknown tool");
                        format!("Unknown tool: {}", tool_name)
                    }
                    Some(tool) => {
                        match invoke_guarded(tool, call.parsed_arguments()).await {
                            Ok(output) => {
                                if is_search_tool(&tool_name)
                                    && !conversation.complete_search(&tool_name)
                                {
                                    warn!(tool = %tool_name, "No pending search record to complete");
                                }
                                output
                            }
                            Err(e) => {
                                warn!(tool = %tool_name, "Tool call failed: {}", e);
                                format!("Tool call failed: {}", e)
                            }
                        }
                    }
                };
                conversation.push(ChatMessage::tool_result(content, &call.id));
            }
        }

        GateOutcome::Reported
    }
}
