//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the relay: a liveness check and
//! the per-client WebSocket endpoint.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ws/{client_id}", get(ws_handler))
        .with_state(app_state)
}
