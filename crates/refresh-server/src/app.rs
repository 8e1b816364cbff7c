//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use refresh_config::HEALTH_PATH;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `endpoint` - Path of the WebSocket upgrade endpoint
pub(crate) fn create_router(state: Arc<AppState>, endpoint: &str) -> Router {
    Router::new()
        .route(endpoint, get(handlers::ws::ws_handler))
        .route(HEALTH_PATH, get(handlers::health::get_health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
