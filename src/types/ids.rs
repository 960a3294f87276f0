//! Newtype wrappers for identifiers.
//!
//! These keep project identifiers and correlation tokens from being mixed up
//! with the many other strings that flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a project in the catalog.
///
/// Assigned exactly once when the project is first committed and never
/// changed afterwards. Public download URLs embed it, so the stored name of a
/// project can change without breaking links.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Wraps an existing identifier.
    ///
    /// Note: This does not check the format. Identifiers arriving over HTTP
    /// are only used as lookup keys.
    pub fn new(s: impl Into<String>) -> Self {
        ProjectId(s.into())
    }

    /// Generates a fresh random (v4) identifier.
    pub fn generate() -> Self {
        ProjectId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

/// Caller-supplied trace token from the `X-Correlation-ID` header.
///
/// Opaque: it is carried through the pipeline and attached to log lines, but
/// never generated or interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new(s: impl Into<String>) -> Self {
        CorrelationId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
