//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Flares
        .route("/sos/flares", post(handlers::raise_flare))
        .route("/sos/flares/active", get(handlers::active_flare))
        .route("/sos/flares/:id", get(handlers::get_flare))
        .route("/sos/flares/:id/resolve", post(handlers::resolve_flare))
        // Hypes
        .route(
            "/sos/flares/:id/hypes",
            get(handlers::list_hypes).post(handlers::send_hype),
        )
        .route("/sos/flares/:id/quota", get(handlers::hype_quota))
        // Preferences
        .route(
            "/sos/preferences",
            get(handlers::get_preferences).put(handlers::update_preferences),
        );

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs.max(1),
        )))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
