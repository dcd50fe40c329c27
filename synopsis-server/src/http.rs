//! synopsis HTTP REST API
//!
//! Axum-based HTTP server exposing summarization and its request log.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - POST /summarize — summarize text and log the request
//! - GET  /history   — most recent log entries, newest first
//! - GET  /health    — health check with store and backend status
//! - GET  /version   — server version info

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use synopsis_core::config::CorsConfig;
use synopsis_core::{LogStore, SummarizationBackend, SynopsisConfig, SynopsisError};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::subsystems::{history, summarize};

/// Accepted range of `max_length`.
pub const MAX_LENGTH_BOUNDS: (i64, i64) = (10, 200);
/// Accepted range of `min_length`.
pub const MIN_LENGTH_BOUNDS: (i64, i64) = (5, 100);

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn LogStore>,
    pub backend: Arc<dyn SummarizationBackend>,
    pub config: SynopsisConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.config.http.cors);
    Router::new()
        .route("/summarize", post(summarize_handler))
        .route("/history", get(history_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Translate the configured cross-origin policy into a tower-http layer.
///
/// A wildcard origin combined with credentials mirrors the caller's origin,
/// since browsers reject `*` on credentialed requests.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allows_any_origin() {
        return if cors.allow_credentials {
            CorsLayer::very_permissive()
        } else {
            CorsLayer::permissive()
        };
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(cors.allow_credentials)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("synopsis HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

fn default_max_length() -> i64 {
    60
}

fn default_min_length() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default = "default_max_length")]
    pub max_length: i64,
    #[serde(default = "default_min_length")]
    pub min_length: i64,
}

impl SummarizeRequest {
    /// Range checks on the length bounds; `(max_length, min_length)` on success.
    pub fn validate_bounds(&self) -> Result<(u32, u32), SynopsisError> {
        let max_length = check_range("max_length", self.max_length, MAX_LENGTH_BOUNDS)?;
        let min_length = check_range("min_length", self.min_length, MIN_LENGTH_BOUNDS)?;
        Ok((max_length, min_length))
    }
}

fn check_range(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<u32, SynopsisError> {
    if value < min || value > max {
        return Err(SynopsisError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value as u32)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub input_length: i64,
    pub execution_time: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

/// HTTP status for each error kind.
pub fn error_status(err: &SynopsisError) -> StatusCode {
    match err {
        SynopsisError::Validation(_) => StatusCode::BAD_REQUEST,
        SynopsisError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SynopsisError::Summarizer(_)
        | SynopsisError::Store(_)
        | SynopsisError::Config(_)
        | SynopsisError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(err: &SynopsisError) -> (StatusCode, serde_json::Value) {
    (
        error_status(err),
        serde_json::json!(ErrorResponse::new(err.to_string())),
    )
}

/// Malformed bodies and query strings keep the extractor's status code
/// (422 / 400 / 415) but use the regular error body.
fn rejection_body(status: StatusCode, message: String) -> (StatusCode, serde_json::Value) {
    tracing::debug!(status = status.as_u16(), message = %message, "Rejected request");
    (status, serde_json::json!(ErrorResponse::new(message)))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries the store and reports the backend.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.store.health().await {
        Ok(sqlite) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "sqlite": sqlite,
                "backend": state.backend.name(),
                "model": state.backend.model(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "synopsis",
    })
}

/// Inner summarize — validates bounds, then runs the summarize subsystem.
pub async fn summarize_inner(
    state: &HttpState,
    req: SummarizeRequest,
) -> (StatusCode, serde_json::Value) {
    let (max_length, min_length) = match req.validate_bounds() {
        Ok(bounds) => bounds,
        Err(e) => return error_body(&e),
    };

    let timeout = state.config.summarizer.timeout_seconds.map(Duration::from_secs);

    match summarize::summarize_and_log(
        req.text,
        max_length,
        min_length,
        state.backend.as_ref(),
        state.store.as_ref(),
        timeout,
    )
    .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            serde_json::json!(SummarizeResponse {
                summary: outcome.summary,
                input_length: outcome.input_length,
                execution_time: outcome.execution_time,
            }),
        ),
        Err(e) => error_body(&e),
    }
}

/// Inner history — newest entries first, `limit` defaulting from config.
pub async fn history_inner(
    state: &HttpState,
    params: HistoryParams,
) -> (StatusCode, serde_json::Value) {
    let limit = params
        .limit
        .unwrap_or(state.config.history.default_limit);

    match history::recent_history(state.store.as_ref(), limit).await {
        Ok(entries) => (StatusCode::OK, serde_json::json!(entries)),
        Err(e) => error_body(&e),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn summarize_handler(
    State(state): State<Arc<HttpState>>,
    req: Result<Json<SummarizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match req {
        Ok(Json(req)) => summarize_inner(&state, req).await,
        Err(rejection) => rejection_body(rejection.status(), rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<HttpState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> impl IntoResponse {
    let (status, body) = match params {
        Ok(Query(params)) => history_inner(&state, params).await,
        Err(rejection) => rejection_body(rejection.status(), rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
