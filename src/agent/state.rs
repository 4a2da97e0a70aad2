//! Conversation state: the message history and the search bookkeeping that
//! rides along with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, Role, ToolCall};

/// Tool names tracked as search operations. Fixed match set; membership is
/// decided by name alone.
pub const SEARCH_CLASS_TOOLS: &[&str] = &["tavily-search", "tavily-extract", "tavily-crawl"];

pub fn is_search_tool(name: &str) -> bool {
    SEARCH_CLASS_TOOLS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Pending,
    Completed,
}

/// One search operation tracked across its approval/execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub tool_name: String,
    pub status: SearchStatus,
    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The unit of persistence for one conversation.
///
/// `messages` is append-only within a pass and never reordered. Whether an
/// approval is pending is always derived from the tail of `messages`, never
/// stored separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub search_history: Vec<SearchRecord>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The single live proposal: present exactly when the last turn is an
    /// assistant message carrying one tool call.
    pub fn pending_call(&self) -> Option<&ToolCall> {
        let last = self.messages.last()?;
        if last.role != Role::Assistant {
            return None;
        }
        match last.tool_calls.as_deref() {
            Some([call]) => Some(call),
            _ => None,
        }
    }

    /// Append a pending search record for a just-proposed search call.
    pub fn record_search(&mut self, tool_name: &str, query: &str) {
        self.search_history.push(SearchRecord {
            query: query.to_string(),
            tool_name: tool_name.to_string(),
            status: SearchStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
        });
    }

    /// Complete the most recently appended pending record with a matching
    /// tool name (newest-to-oldest scan). Returns false when nothing matches;
    /// the caller decides how loudly to complain.
    pub fn complete_search(&mut self, tool_name: &str) -> bool {
        for record in self.search_history.iter_mut().rev() {
            if record.status == SearchStatus::Pending && record.tool_name == tool_name {
                record.status = SearchStatus::Completed;
                record.completed_at = Some(Utc::now());
                return true;
            }
        }
        false
    }

    /// Bulk-discard the search bookkeeping. Records are never removed one at
    /// a time; a finished conversation drops them all at once.
    pub fn clear_search_history(&mut self) {
        self.search_history.clear();
    }
}
