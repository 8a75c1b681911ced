use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device audio channel
        .route("/ws/audio", get(handlers::device_audio))
        // Session queries and control
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/:session_id",
            get(handlers::get_session).delete(handlers::stop_session),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
