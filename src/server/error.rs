//! Error type shared by all HTTP handlers.
//!
//! Clients only ever see a generic message; the detail is logged.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::catalog::CatalogError;
use crate::dispatch::DispatchError;
use crate::validation::ValidationError;
use crate::webhooks::FilterError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Webhook secret or signature did not match.
    #[error("unauthorized webhook delivery")]
    Unauthorized,

    /// Body could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Request decoded but a required field is empty.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Payload exceeds the transport's size limit.
    #[error("payload too large: {0}")]
    TooLarge(String),

    /// Transport or catalog is down.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// No such project, release or file.
    #[error("not found")]
    NotFound,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::Malformed(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message clients see.
    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Malformed(_) => "Invalid request".to_string(),
            ApiError::Validation(e) => format!("Repository {} is required", e.field()),
            ApiError::TooLarge(_) => "Request too large".to_string(),
            ApiError::NotFound => "Not found".to_string(),
            ApiError::Unavailable(_) | ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorBody {
            status: "error",
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::Unauthorized => ApiError::Unauthorized,
            FilterError::Malformed(e) => ApiError::Malformed(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Unavailable(detail) => ApiError::Unavailable(detail),
            DispatchError::Rejected(detail) => ApiError::TooLarge(detail),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => ApiError::NotFound,
            CatalogError::Unavailable(detail) => ApiError::Unavailable(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
