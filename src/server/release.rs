//! Direct release API.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use super::{ApiError, AppState, Correlation};
use crate::types::{CorrelationId, ReleaseMessage, ReleaseRequest};
use crate::validation::validate;

/// `POST /api/v1/release` (and the legacy `POST /api/v1/project`).
///
/// Body: `{"Name": ..., "URL": ..., "Version": ...}`. Answers 202 once the
/// request is in the transport.
pub async fn release_handler(
    State(app_state): State<AppState>,
    Correlation(correlation_id): Correlation,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: ReleaseRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    info!(project = %request.name, version = %request.version, "Release requested");
    dispatch_release(&app_state, request, correlation_id).await?;

    Ok(StatusCode::ACCEPTED)
}

/// Validates a request, encodes it and hands it to the dispatcher.
///
/// Every producer goes through here, so nothing with an empty field reaches
/// the transport.
pub(crate) async fn dispatch_release(
    app_state: &AppState,
    request: ReleaseRequest,
    correlation_id: Option<CorrelationId>,
) -> Result<(), ApiError> {
    validate(&request)?;

    let payload = ReleaseMessage::new(request, correlation_id)
        .to_bytes()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    app_state.dispatcher().send(payload).await?;
    Ok(())
}
