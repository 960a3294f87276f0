//! Required-field validation for release requests.
//!
//! Applied to every request before dispatch, whether it came from a webhook
//! or the direct API. Only emptiness is checked: URLs and versions are
//! passed through untouched so any clone URL scheme and any tag naming
//! convention is accepted.

use std::fmt;

use thiserror::Error;

use crate::types::ReleaseRequest;

/// A required field of [`ReleaseRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestField {
    Name,
    Url,
    Version,
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestField::Name => write!(f, "name"),
            RequestField::Url => write!(f, "url"),
            RequestField::Version => write!(f, "version"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("repository {0} is required")]
    MissingField(RequestField),
}

impl ValidationError {
    pub fn field(&self) -> RequestField {
        match self {
            ValidationError::MissingField(field) => *field,
        }
    }
}

/// Checks that name, url and version are all non-empty, in that order.
///
/// # Examples
///
/// ```
/// use rabbit::types::ReleaseRequest;
/// use rabbit::validation::{validate, RequestField, ValidationError};
///
/// assert!(validate(&ReleaseRequest::new("app", "https://x/app.git", "v1")).is_ok());
/// assert_eq!(
///     validate(&ReleaseRequest::new("app", "", "v1")),
///     Err(ValidationError::MissingField(RequestField::Url))
/// );
/// ```
pub fn validate(request: &ReleaseRequest) -> Result<(), ValidationError> {
    let fields = [
        (RequestField::Name, &request.name),
        (RequestField::Url, &request.url),
        (RequestField::Version, &request.version),
    ];

    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((field, _)) => Err(ValidationError::MissingField(*field)),
        None => Ok(()),
    }
}
