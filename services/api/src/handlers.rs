//! Plain HTTP handlers.

use axum::Json;
use serde::Serialize;

#[derive(Serialize, Debug, PartialEq)]
pub struct StatusResponse {
    pub message: String,
}

/// Liveness check.
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Voice Service API is running".to_string(),
    })
}
