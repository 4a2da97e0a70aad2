//! # toolgate
//!
//! A conversational agent server that puts a human approval gate in front of
//! every tool execution.
//!
//! This library provides:
//! - An HTTP API for session management, chat turns, and approval decisions
//! - A two-node agent cycle: a reasoner proposing at most one tool call per
//!   turn, and an action gate that suspends the conversation until the call
//!   is approved or rejected
//! - A tool catalog mixing built-in tools with tools discovered from remote
//!   tool-server processes
//!
//! ## Architecture
//!
//! A conversation pass alternates between two components:
//! 1. The reasoner calls the model with the message history and the merged
//!    action catalog, and yields either a final answer or one proposed call
//! 2. The action gate records the proposal, suspends the session, and waits
//!    for an external decision
//! 3. On approval the gate executes the tool and folds the result back into
//!    the history; on rejection it folds in a rejection turn instead
//! 4. The cycle repeats until the model answers without proposing a call
//!
//! Suspension is a persisted session state, not an in-process wait: the
//! decision arrives through a separate resume entry point, arbitrarily later.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolgate::{config::Config, api};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod api;
pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
