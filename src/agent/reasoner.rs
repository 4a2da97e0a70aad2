//! Reasoner: one model turn deciding between a final answer and exactly one
//! proposed tool call.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::llm::{ChatClient, ChatMessage, ToolCall};
use crate::tools::{ToolCatalog, ToolSpec};

use super::prompt::build_system_prompt;
use super::state::{is_search_tool, Conversation};
use super::AgentError;

/// What one reasoner turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonerOutcome {
    /// Terminal assistant message; the pass is over.
    Final { content: String },

    /// One proposed call, appended to the history and awaiting the gate.
    Proposal { call: ToolCall },

    /// The proposal names a host-provided action. The pass ends here and the
    /// proposal is handed back upward untouched; the gate never sees it.
    HostAction { call: ToolCall },
}

pub struct Reasoner {
    llm: Arc<dyn ChatClient>,
    model: String,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn ChatClient>, model: String) -> Self {
        Self { llm, model }
    }

    /// Run one turn: call the model with the full history and the merged
    /// action catalog, then fold the outcome into the conversation.
    ///
    /// Model failures propagate untouched; no retry happens here.
    pub async fn step(
        &self,
        conversation: &mut Conversation,
        catalog: &ToolCatalog,
        host_actions: &[ToolSpec],
    ) -> Result<ReasonerOutcome, AgentError> {
        // Host actions go ahead of catalog tools in the merged schema list.
        let mut schemas: Vec<Value> = host_actions.iter().map(ToolSpec::to_schema).collect();
        schemas.extend(catalog.schemas().await);

        let system = ChatMessage::system(build_system_prompt(conversation.search_history.len()));
        let mut wire = Vec::with_capacity(conversation.messages.len() + 1);
        wire.push(system);
        wire.extend(conversation.messages.iter().cloned());

        let response = self
            .llm
            .chat_completion(&self.model, &wire, Some(&schemas))
            .await?;

        let mut calls = response.tool_calls.unwrap_or_default();
        if calls.is_empty() {
            let content = response.content.unwrap_or_default();
            conversation.push(ChatMessage::assistant(Some(content.clone()), None));
            return Ok(ReasonerOutcome::Final { content });
        }

        if calls.len() > 1 {
            debug!(
                discarded = calls.len() - 1,
                "Model returned multiple calls; honoring only the first"
            );
        }
        let call = calls.remove(0);

        // Store the assistant turn with only the honored call, so the stored
        // history itself upholds the single-pending-proposal rule.
        conversation.push(ChatMessage::assistant(
            response.content.clone(),
            Some(vec![call.clone()]),
        ));

        if host_actions.iter().any(|a| a.name == call.function.name) {
            info!(action = %call.function.name, "Proposal targets a host action; ending the pass");
            return Ok(ReasonerOutcome::HostAction { call });
        }

        if is_search_tool(&call.function.name) {
            let args = call.parsed_arguments();
            let query = args["query"].as_str().unwrap_or_default();
            info!(tool = %call.function.name, query = %query, "Recording search query");
            conversation.record_search(&call.function.name, query);
        }

        Ok(ReasonerOutcome::Proposal { call })
    }
}
