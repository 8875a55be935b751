//! HTTP Endpoints
//!
//! - `POST /chat/test-financial-parsing` - parse one message
//! - `GET /api/parsing/stats` - aggregate monitor snapshot
//! - `GET /health` - model slot readiness
//! - `GET /metrics` - Prometheus text
//! - `POST /admin/reload-models` - drop cached models and reload

use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use dompet_core::{MonitorSnapshot, ParseMonitor, ParsedTransaction};

use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let timeout = Duration::from_secs(config.server.timeout_seconds);
    drop(config);

    Router::new()
        .route("/chat/test-financial-parsing", post(test_financial_parsing))
        .route("/api/parsing/stats", get(parsing_stats))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/admin/reload-models", post(reload_models))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

fn localhost_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build CORS layer from configured origins
///
/// Disabled CORS is permissive; no valid origins means localhost only.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return localhost_cors();
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub success: bool,
    pub request_id: String,
    pub parsed: ParsedTransaction,
    pub overall_confidence: f32,
    pub needs_clarification: bool,
}

/// Parse a single chat message
///
/// POST /chat/test-financial-parsing
async fn test_financial_parsing(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseResponse>, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message must not be empty".to_string()));
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let threshold = state.get_config().server.clarification_threshold;

    let parsed = state.parser.parse(&request.message).await;
    let overall_confidence = parsed.overall_confidence();
    let needs_clarification = parsed.needs_clarification(threshold);

    tracing::info!(
        request_id = %request_id,
        intent = %parsed.intent(),
        category = %parsed.category(),
        amount = %parsed.amount(),
        confidence = overall_confidence,
        needs_clarification,
        "Parsed message"
    );

    Ok(Json(ParseResponse {
        success: true,
        request_id,
        parsed,
        overall_confidence,
        needs_clarification,
    }))
}

/// GET /api/parsing/stats
async fn parsing_stats(State(state): State<AppState>) -> Json<MonitorSnapshot> {
    Json(state.monitor.snapshot())
}

/// Model readiness
///
/// Always 200: a failed model only degrades its field to the rule-based
/// parser.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models = state.registry.status();
    let failed = models
        .values()
        .any(|s| matches!(s, dompet_parser::SlotStatus::Failed { .. }));

    Json(serde_json::json!({
        "status": if failed { "degraded" } else { "healthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "models": models,
    }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics exporter not installed".to_string(),
        ),
    }
}

/// POST /admin/reload-models
async fn reload_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models = state.reload_models().await;
    Json(serde_json::json!({
        "status": "success",
        "models": models,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dompet_config::Settings;

    #[tokio::test]
    async fn test_router_creation() {
        let state = AppState::new(Settings::default());
        let _ = create_router(state);
    }

    #[test]
    fn test_cors_with_invalid_origins_falls_back() {
        let _ = build_cors_layer(&["bad\norigin".to_string()], true);
        let _ = build_cors_layer(&[], false);
    }
}
