//! HTTP surface: non-streaming generation endpoints plus health.
//!
//! - POST /generate/single
//! - POST /generate/server-and-user
//! - POST /generate/conversation
//! - GET /health
//!
//! WebSocket routes are registered here too but handled in [`super::ws_api`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::RelayError;
use crate::provider::openai::OpenAiClient;
use crate::provider::types::Message;
use crate::server::schemas::{
    CompletionResponse, ConversationRequest, HealthResponse, ServerAndUserRequest, SingleRequest,
};
use crate::server::ws_api;

/// Application state shared across handlers.
pub struct AppState {
    pub provider: Arc<OpenAiClient>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/generate/single", post(single_response))
        .route("/generate/server-and-user", post(server_and_user_response))
        .route("/generate/conversation", post(conversation_response))
        .route("/ws/generate/single", get(ws_api::generate_single))
        .route("/ws/generate/server-and-user", get(ws_api::generate_server_and_user))
        .route("/ws/generate/conversation", get(ws_api::generate_conversation))
        .route("/ws/assistant/single", get(ws_api::assistant_single))
        .route("/ws/assistant/server-and-user", get(ws_api::assistant_server_and_user))
        .route("/ws/assistant/conversation", get(ws_api::assistant_conversation))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Failures surface as a generic server error carrying the underlying
/// message as detail.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn single_response(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SingleRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    info!("Single completion request");
    let response = state.provider.complete(vec![Message::user(req.prompt)]).await?;
    Ok(Json(CompletionResponse { response }))
}

async fn server_and_user_response(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ServerAndUserRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    info!("Server-and-user completion request");
    let messages = vec![Message::system(req.server_prompt), Message::user(req.user_prompt)];
    let response = state.provider.complete(messages).await?;
    Ok(Json(CompletionResponse { response }))
}

async fn conversation_response(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConversationRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    info!(messages = req.messages.len(), "Conversation completion request");
    let response = state.provider.complete(req.messages).await?;
    Ok(Json(CompletionResponse { response }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
