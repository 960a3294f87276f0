//! Health check endpoint for liveness probes.

use axum::Json;

use super::StatusBody;

/// Returns `{"status":"ok"}` while the server accepts connections.
pub async fn health_handler() -> Json<StatusBody> {
    Json(StatusBody::ok())
}
