//! Router assembly: engine CRUD endpoints, the trigger endpoint, CORS, and
//! HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - Engine CRUD under `/gamification/engine/...`
/// - The trigger endpoint at `/gamification/trigger/metric`
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::http_health))
        // Metric definitions
        .route(
            "/gamification/engine/metrics",
            post(http::http_create_metric)
                .get(http::http_list_metrics)
                .put(http::http_update_metric),
        )
        .route(
            "/gamification/engine/metrics/:metricId",
            get(http::http_get_metric).delete(http::http_delete_metric),
        )
        // Achievement definitions
        .route(
            "/gamification/engine/achievements",
            post(http::http_create_achievement)
                .get(http::http_list_achievements)
                .put(http::http_update_achievement),
        )
        .route(
            "/gamification/engine/achievements/:achievementId",
            get(http::http_get_achievement).delete(http::http_delete_achievement),
        )
        // User metric values
        .route(
            "/gamification/engine/user/metrics",
            post(http::http_create_user_metric).put(http::http_update_user_metric),
        )
        .route(
            "/gamification/engine/user/:userId/metrics",
            get(http::http_list_user_metrics),
        )
        .route(
            "/gamification/engine/user/:userId/achievements",
            get(http::http_list_user_achievements),
        )
        // Trigger evaluation
        .route("/gamification/trigger/metric", post(http::http_trigger_metric))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
