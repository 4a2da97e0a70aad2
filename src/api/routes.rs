//! HTTP handlers for the session API.
//!
//! Every handler loads the session, runs at most one pass of the agent
//! loop, and saves the session back when the pass settles. The decision
//! handler additionally checkpoints right after the gate executes, so an
//! approved tool runs at most once no matter how the rest of the pass
//! fares; a replayed decision resumes from the post-execution state. On
//! the other entry points a failed model call leaves the stored checkpoint
//! exactly as it was before the request, and the caller can retry.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::{ActionGate, AgentError, AgentLoop, TurnOutcome};
use crate::api::session_store::{Session, SessionState, SessionStore};
use crate::api::types::{
    ActionResultRequest, CreateSessionResponse, DecisionRequest, HealthResponse, HostActionView,
    MessageRequest, SessionSummary, SessionView, TurnResponse,
};
use crate::config::Config;
use crate::llm::ChatMessage;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub agent: Arc<AgentLoop>,
    pub store: Arc<dyn SessionStore>,
    session_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(config: Config, agent: Arc<AgentLoop>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            agent,
            store,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// One conversation is processed strictly sequentially. Mutating
    /// handlers hold this lock across their load/run/save span so
    /// concurrent requests against the same session queue up instead of
    /// interleaving.
    async fn session_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.session_locks
            .lock()
            .await
            .entry(id)
            .or_default()
            .clone()
    }

    async fn drop_session_lock(&self, id: Uuid) {
        self.session_locks.lock().await.remove(&id);
    }
}

/// Health check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a fresh session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, String)> {
    let session = Session::new();
    state
        .store
        .save_session(&session)
        .await
        .map_err(internal_error)?;
    info!(session_id = %session.id, "Created session");
    Ok(Json(CreateSessionResponse {
        id: session.id,
        state: session.state,
    }))
}

/// List sessions, most recently updated first.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, String)> {
    let sessions = state
        .store
        .list_sessions()
        .await
        .map_err(internal_error)?;
    let summaries = sessions
        .into_iter()
        .map(|s| SessionSummary {
            id: s.id,
            state: s.state,
            updated_at: s.updated_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// Get a session's full transcript and state.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = load_session(&state, id).await?;
    let approval_request = match session.state {
        SessionState::AwaitingApproval => ActionGate.suspension_request(&session.conversation),
        _ => None,
    };
    Ok(Json(SessionView {
        id: session.id,
        state: session.state,
        messages: session.conversation.messages,
        search_history: session.conversation.search_history,
        approval_request,
        created_at: session.created_at,
        updated_at: session.updated_at,
    }))
}

/// Delete a session.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    // Deletion queues on the per-session lock like every mutating pass: any
    // in-flight pass commits before the row is removed, and later passes
    // find no session to load or save.
    let lock = state.session_lock(id).await;
    let _guard = lock.lock().await;

    let deleted = state
        .store
        .delete_session(id)
        .await
        .map_err(internal_error)?;
    state.drop_session_lock(id).await;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Session {} not found", id)))
    }
}

/// Send a user message and run the loop until it completes or suspends.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let lock = state.session_lock(id).await;
    let _guard = lock.lock().await;

    let mut session = load_session(&state, id).await?;
    if session.state != SessionState::Idle {
        return Err((
            StatusCode::CONFLICT,
            format!(
                "Session is {}; resolve the pending action before sending a message",
                session.state.as_str()
            ),
        ));
    }

    session.conversation.push(ChatMessage::user(&body.content));
    let outcome = state
        .agent
        .run_turn(&mut session.conversation, &body.host_actions)
        .await
        .map_err(agent_error)?;

    finish_pass(&state, session, outcome).await
}

/// Resolve a pending approval and continue the suspended pass.
pub async fn post_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let lock = state.session_lock(id).await;
    let _guard = lock.lock().await;

    let mut session = load_session(&state, id).await?;
    if session.state != SessionState::AwaitingApproval {
        return Err((
            StatusCode::CONFLICT,
            "Session has no pending approval".to_string(),
        ));
    }

    // An unrecognized decision surfaces as 400 before the conversation is
    // touched, so the suspended checkpoint stays valid for a retry.
    state
        .agent
        .apply_decision(&mut session.conversation, &body.decision)
        .await
        .map_err(agent_error)?;

    // Commit the gate's verdict before the follow-up model call. Should the
    // rest of the pass fail, the stored checkpoint already holds the result
    // turn, and a replayed decision finds no pending call to re-run: the
    // gate hands control straight back to the reasoner.
    session.touch();
    state
        .store
        .save_session(&session)
        .await
        .map_err(internal_error)?;

    let outcome = state
        .agent
        .run_turn(&mut session.conversation, &body.host_actions)
        .await
        .map_err(agent_error)?;

    finish_pass(&state, session, outcome).await
}

/// Report the result of a host-executed action and continue the pass.
pub async fn post_action_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActionResultRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let lock = state.session_lock(id).await;
    let _guard = lock.lock().await;

    let mut session = load_session(&state, id).await?;
    if session.state != SessionState::AwaitingHostAction {
        return Err((
            StatusCode::CONFLICT,
            "Session is not waiting on a host action".to_string(),
        ));
    }
    let pending_id = session.conversation.pending_call().map(|c| c.id.clone());
    if pending_id.as_deref() != Some(body.call_id.as_str()) {
        return Err((
            StatusCode::CONFLICT,
            format!("call_id {} does not match the pending action", body.call_id),
        ));
    }

    session
        .conversation
        .push(ChatMessage::tool_result(&body.result, &body.call_id));
    let outcome = state
        .agent
        .run_turn(&mut session.conversation, &body.host_actions)
        .await
        .map_err(agent_error)?;

    finish_pass(&state, session, outcome).await
}

async fn load_session(state: &AppState, id: Uuid) -> Result<Session, (StatusCode, String)> {
    state
        .store
        .get_session(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {} not found", id)))
}

/// Commit a successful pass: fold the outcome into the session, stamp it,
/// persist, and shape the response.
async fn finish_pass(
    state: &AppState,
    mut session: Session,
    outcome: TurnOutcome,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let response = apply_outcome(&mut session, outcome);
    session.touch();
    state
        .store
        .save_session(&session)
        .await
        .map_err(internal_error)?;
    Ok(Json(response))
}

/// Map a pass outcome onto the session state machine.
fn apply_outcome(session: &mut Session, outcome: TurnOutcome) -> TurnResponse {
    match outcome {
        TurnOutcome::Completed { message } => {
            session.state = SessionState::Idle;
            TurnResponse {
                session_id: session.id,
                state: session.state,
                message: Some(message),
                approval_request: None,
                host_action: None,
            }
        }
        TurnOutcome::Suspended { request } => {
            session.state = SessionState::AwaitingApproval;
            TurnResponse {
                session_id: session.id,
                state: session.state,
                message: None,
                approval_request: Some(request),
                host_action: None,
            }
        }
        TurnOutcome::HostAction { call } => {
            session.state = SessionState::AwaitingHostAction;
            TurnResponse {
                session_id: session.id,
                state: session.state,
                message: None,
                approval_request: None,
                host_action: Some(HostActionView::from_call(&call)),
            }
        }
    }
}

fn agent_error(e: AgentError) -> (StatusCode, String) {
    match e {
        AgentError::UnrecognizedDecision(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        AgentError::Llm(_) => {
            error!("Model call failed: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string())
        }
        AgentError::MaxIterations(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn internal_error(e: String) -> (StatusCode, String) {
    error!("Internal error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e)
}
