//! Release builders.
//!
//! A builder turns a release request into concrete, checksummed binaries.
//! The worker only sees the [`Builder`] trait; [`GitBuilder`] is the
//! production implementation that clones the tagged source and runs a build
//! command in it.

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Binary;

pub mod git;

pub use git::GitBuilder;

/// Errors from a build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An external command exited unsuccessfully.
    #[error("command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The build ran but left nothing in the output directory.
    #[error("build produced no artifacts in {0}")]
    NoArtifacts(PathBuf),

    /// A request field cannot be used as a path component.
    #[error("unsafe path component: {0:?}")]
    UnsafePath(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking build task panicked or was cancelled.
    #[error("build task aborted: {0}")]
    Aborted(String),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Builds the binaries of a release.
///
/// Implementations return binaries in a stable order; the worker stores them
/// exactly as returned.
///
/// # Example (scripted builder for testing)
///
/// ```ignore
/// struct FixedBuilder(Vec<Binary>);
///
/// impl Builder for FixedBuilder {
///     async fn build(&self, _name: &str, _url: &str, _version: &str) -> Result<Vec<Binary>> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait Builder: Send + Sync {
    fn build(
        &self,
        name: &str,
        url: &str,
        version: &str,
    ) -> impl Future<Output = Result<Vec<Binary>>> + Send;
}

/// Checks that a value is usable as a single path component.
///
/// Rejects empty values, `.`/`..`, and anything containing a path separator
/// or NUL byte.
pub fn validate_path_component(value: &str) -> Result<()> {
    let unsafe_component = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0');

    if unsafe_component {
        Err(BuildError::UnsafePath(value.to_string()))
    } else {
        Ok(())
    }
}
