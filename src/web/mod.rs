//! HTTP surface: WebSocket chat plus a few read-only REST endpoints.

pub mod protocol;
mod ws;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::create_provider;
use crate::orchestrator::TurnOrchestrator;
use crate::session::SessionManager;
use crate::store::{Database, LibSqlBackend};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<SessionManager>,
    pub db: Arc<dyn Database>,
}

impl AppState {
    /// Wire the provider, the store and the orchestrator from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = create_provider(&config.llm())?;
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        let orchestrator = Arc::new(TurnOrchestrator::new(
            llm,
            Arc::clone(&db),
            config.orchestrator.clone(),
        ));
        Ok(Self {
            orchestrator,
            sessions: Arc::new(SessionManager::new(Arc::clone(&db))),
            db,
        })
    }
}

/// Build the Axum router with chat WebSocket and REST routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(ws::ws_chat_handler))
        .route("/api/sessions/{id}/history", get(session_history))
        .route("/api/profiles/{username}", get(get_profile))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "quizbot"
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// GET /api/sessions/{id}/history
///
/// UI history of a session, loading it from the store if needed.
async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid session id");
    };
    match state.sessions.get(id).await {
        Ok(Some(session)) => {
            let s = session.lock().await;
            Json(serde_json::json!({
                "session_id": s.id,
                "username": s.username(),
                "entries": s.ui_history,
            }))
            .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Failed to load session");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load session")
        }
    }
}

/// GET /api/profiles/{username}
async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    match state.db.find_profile(&username).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => {
            warn!(username = %username, error = %e, "Failed to load profile");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile")
        }
    }
}
