//! Persistent catalog of projects, releases and binaries.
//!
//! The catalog is the only state shared between HTTP handlers and workers.
//! A project is the unit of storage; every write replaces one whole project
//! document, and every write to a given project is mutually exclusive with
//! other writes to it.
//!
//! # Backends
//!
//! - [`FileCatalog`]: one JSON document per project, written atomically,
//!   serialised per project by in-process async locks.
//! - [`RedisCatalog`]: one JSON string per project, updated by
//!   compare-and-swap so that several processes can commit concurrently.
//!
//! The backend is chosen once at startup from configuration and wrapped in
//! [`CatalogBackend`].

use std::future::Future;

use thiserror::Error;

use crate::config::{CatalogConfig, CatalogDriver};
use crate::types::{Project, ProjectId, Release};

pub mod file;
pub mod redis;

pub use file::FileCatalog;
pub use redis::RedisCatalog;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store could not be reached or refused the operation.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// No project with this identifier.
    #[error("project not found: {0}")]
    NotFound(ProjectId),

    /// A stored document could not be decoded.
    #[error("corrupt project record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// Concurrent writers kept winning the race for this project.
    #[error("gave up committing to project {name} after {attempts} conflicting attempts")]
    Conflict { name: String, attempts: u32 },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Persistence interface used by workers and read handlers.
pub trait Catalog: Send + Sync {
    /// Whether a project with this identifier exists.
    fn exists(&self, id: &ProjectId) -> impl Future<Output = Result<bool>> + Send;

    /// Reads one project.
    fn get(&self, id: &ProjectId) -> impl Future<Output = Result<Project>> + Send;

    /// Reads every project, in no particular order.
    fn list(&self) -> impl Future<Output = Result<Vec<Project>>> + Send;

    /// Replaces the stored representation of a project.
    fn upsert(&self, project: &Project) -> impl Future<Output = Result<()>> + Send;

    /// Records a release under the project with the given name.
    ///
    /// Creates the project (with a new identifier) if no project has this
    /// name yet. The read-modify-write is atomic per project: two commits
    /// racing on the same project both end up in its release map, and a
    /// commit for an already-recorded version replaces that version only.
    /// Returns the project as stored.
    fn commit_release(
        &self,
        name: &str,
        release: Release,
    ) -> impl Future<Output = Result<Project>> + Send;
}

/// The catalog selected by configuration.
#[derive(Debug)]
pub enum CatalogBackend {
    File(FileCatalog),
    Redis(RedisCatalog),
}

impl CatalogBackend {
    /// Opens the configured backend.
    ///
    /// Opening never touches the network; an unreachable Redis server shows
    /// up as [`CatalogError::Unavailable`] on first use.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        match config.driver {
            CatalogDriver::File => Ok(CatalogBackend::File(FileCatalog::open(&config.file.path)?)),
            CatalogDriver::Redis => Ok(CatalogBackend::Redis(RedisCatalog::from_config(
                &config.redis,
            )?)),
        }
    }
}

impl Catalog for CatalogBackend {
    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        match self {
            CatalogBackend::File(c) => c.exists(id).await,
            CatalogBackend::Redis(c) => c.exists(id).await,
        }
    }

    async fn get(&self, id: &ProjectId) -> Result<Project> {
        match self {
            CatalogBackend::File(c) => c.get(id).await,
            CatalogBackend::Redis(c) => c.get(id).await,
        }
    }

    async fn list(&self) -> Result<Vec<Project>> {
        match self {
            CatalogBackend::File(c) => c.list().await,
            CatalogBackend::Redis(c) => c.list().await,
        }
    }

    async fn upsert(&self, project: &Project) -> Result<()> {
        match self {
            CatalogBackend::File(c) => c.upsert(project).await,
            CatalogBackend::Redis(c) => c.upsert(project).await,
        }
    }

    async fn commit_release(&self, name: &str, release: Release) -> Result<Project> {
        match self {
            CatalogBackend::File(c) => c.commit_release(name, release).await,
            CatalogBackend::Redis(c) => c.commit_release(name, release).await,
        }
    }
}

/// Applies a release to the current state of a project.
///
/// Shared by the backends so that both merge at the release-map level in
/// exactly the same way.
pub(crate) fn merge_release(
    current: Option<Project>,
    id: ProjectId,
    name: &str,
    release: Release,
) -> Project {
    let mut project = current.unwrap_or_else(|| Project::with_id(id, name));
    project.name = name.to_string();
    project.record_release(release);
    project
}
