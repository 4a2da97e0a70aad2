//! Agent module - the gated conversation cycle.
//!
//! One pass over a conversation alternates between two nodes:
//! 1. The reasoner calls the model with the history and the merged action
//!    catalog, yielding a final answer or exactly one proposed tool call
//! 2. The action gate records the proposal and suspends the pass until an
//!    external approval decision arrives
//! 3. On approval the gate executes the tool (or reports why it could not)
//!    and folds exactly one result turn back into the history; on rejection
//!    it folds in a rejection turn instead
//! 4. Control returns to the reasoner until it answers without a proposal
//!
//! Suspension is not an in-process wait: the session is persisted in the
//! suspended state and resumed later through [`AgentLoop::resume_turn`].

mod agent_loop;
mod gate;
mod prompt;
mod reasoner;
mod state;

pub use agent_loop::{AgentLoop, TurnOutcome};
pub use gate::{ActionGate, ApprovalRequest, Decision, GateOutcome};
pub use prompt::build_system_prompt;
pub use reasoner::{Reasoner, ReasonerOutcome};
pub use state::{is_search_tool, Conversation, SearchRecord, SearchStatus, SEARCH_CLASS_TOOLS};

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Model transport or API failure. Never recovered inside the loop; the
    /// caller owns reconnection policy.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The supplied decision is not one of the accepted verdict spellings.
    /// The conversation is left exactly as it was.
    #[error("Unrecognized approval decision: '{0}'")]
    UnrecognizedDecision(String),

    #[error("Conversation pass exceeded {0} iterations")]
    MaxIterations(usize),
}
