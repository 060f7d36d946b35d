// HTTP routes configuration

use crate::core::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Account endpoints
        .route("/api/register", post(crate::handlers::auth::register_handler))
        .route("/api/login", post(crate::handlers::auth::login_handler))
        .route("/api/validate-session", post(crate::handlers::auth::validate_session_handler))
        .route("/api/logout", post(crate::handlers::auth::logout_handler))
        .route("/api/submit-code", post(crate::handlers::subscription::submit_code_handler))

        .route("/health", get(crate::handlers::health::health_handler))

        // 404 fallback for all unmatched routes
        .fallback(crate::handlers::fallback::fallback_handler)

        // The browser front-end is served from another origin
        .layer(CorsLayer::permissive())

        .with_state(state)
}
