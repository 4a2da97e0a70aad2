//! HTTP API surface.
//!
//! Sessions are the unit of interaction: a caller creates one, posts
//! messages into it, and answers approval requests or host-action results
//! when a pass suspends. All conversation state lives in the session store,
//! so a suspended session can be resumed from any process that shares it.

pub mod routes;
pub mod session_store;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::AgentLoop;
use crate::config::{load_tool_servers, Config};
use crate::llm::OpenAiCompatClient;
use crate::tools::ToolCatalog;

use routes::AppState;
use session_store::create_session_store;

/// Assemble the shared application state from configuration.
pub fn build_state(config: Config) -> Arc<AppState> {
    let servers = match load_tool_servers(&config.tools_config_path) {
        Ok(servers) => servers,
        Err(e) => {
            warn!("Failed to load tool server config: {}", e);
            Vec::new()
        }
    };
    let catalog = Arc::new(ToolCatalog::with_defaults(servers));

    let llm = Arc::new(OpenAiCompatClient::new(
        config.api_key.clone(),
        config.api_base.clone(),
    ));
    let agent = Arc::new(AgentLoop::new(
        llm,
        config.default_model.clone(),
        catalog,
        config.max_iterations,
    ));

    let store = create_session_store(&config);

    Arc::new(AppState::new(config, agent, store))
}

/// Build the router with all session routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/sessions",
            post(routes::create_session).get(routes::list_sessions),
        )
        .route(
            "/api/sessions/:id",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/api/sessions/:id/messages", post(routes::post_message))
        .route("/api/sessions/:id/decision", post(routes::post_decision))
        .route(
            "/api/sessions/:id/action_result",
            post(routes::post_action_result),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the API until the process exits.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = build_state(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
