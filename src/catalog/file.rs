//! Filesystem catalog.
//!
//! # Layout
//!
//! ```text
//! <path>/projects/<uuid>.json
//! ```
//!
//! Each file holds one [`ProjectRecord`]. Records are written atomically using
//! a write-to-temp-then-rename pattern:
//! 1. Write to `<uuid>.json.tmp`
//! 2. fsync the file
//! 3. Rename to `<uuid>.json`
//! 4. fsync the directory
//!
//! Readers therefore see either the old or the new project, never a partial
//! write. A single process owns the directory, so in-process async locks are
//! enough for mutual exclusion:
//! - every write to a record holds the lock for its project id
//! - name lookups that may create a project hold the lock for that name
//!   first, and so does an upsert for the name it writes
//!
//! Locks are always taken name first, then id.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{Catalog, CatalogError, Result, merge_release};
use crate::build::validate_path_component;
use crate::locks::KeyedLocks;
use crate::types::{Project, ProjectId, Release};

/// Current on-disk record format version.
pub const SCHEMA_VERSION: u32 = 1;

/// A project as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub project: Project,
}

/// Catalog backed by one JSON file per project.
#[derive(Debug)]
pub struct FileCatalog {
    projects_dir: PathBuf,
    name_locks: KeyedLocks<String>,
    id_locks: KeyedLocks<ProjectId>,
}

impl FileCatalog {
    /// Opens (creating if needed) a catalog rooted at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let projects_dir = path.join("projects");
        fs::create_dir_all(&projects_dir).map_err(|e| unavailable(&projects_dir, e))?;

        Ok(FileCatalog {
            projects_dir,
            name_locks: KeyedLocks::default(),
            id_locks: KeyedLocks::default(),
        })
    }

    /// Path of a project's record, or `None` if the id cannot name a file.
    fn record_path(&self, id: &ProjectId) -> Option<PathBuf> {
        validate_path_component(id.as_str()).ok()?;
        Some(self.projects_dir.join(format!("{}.json", id)))
    }

    /// Linear scan for the project with this exact name.
    fn find_by_name(&self, name: &str) -> Result<Option<Project>> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|project| project.name == name))
    }

    fn load_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        match self.record_path(id) {
            Some(path) => Ok(load_record(&path)?.map(|record| record.project)),
            None => Ok(None),
        }
    }

    fn read_all(&self) -> Result<Vec<Project>> {
        let entries =
            fs::read_dir(&self.projects_dir).map_err(|e| unavailable(&self.projects_dir, e))?;

        let mut projects = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| unavailable(&self.projects_dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok(Some(record)) => projects.push(record.project),
                // Removed between read_dir and open.
                Ok(None) => {}
                Err(CatalogError::Corrupt { id, reason }) => {
                    warn!(record = %id, reason = %reason, "Skipping corrupt project record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(projects)
    }

    fn write(&self, project: &Project) -> Result<()> {
        let path = self
            .record_path(&project.id)
            .ok_or_else(|| CatalogError::Corrupt {
                id: project.id.to_string(),
                reason: "project id is not a valid file name".to_string(),
            })?;

        let record = ProjectRecord {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            project: project.clone(),
        };
        save_record_atomic(&path, &record)
    }
}

impl Catalog for FileCatalog {
    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        Ok(self.record_path(id).is_some_and(|path| path.is_file()))
    }

    async fn get(&self, id: &ProjectId) -> Result<Project> {
        self.load_project(id)?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Project>> {
        self.read_all()
    }

    #[instrument(skip_all, fields(project = %project.name, id = %project.id))]
    async fn upsert(&self, project: &Project) -> Result<()> {
        let _name = self.name_locks.lock(project.name.clone()).await;
        let _id = self.id_locks.lock(project.id.clone()).await;
        self.write(project)
    }

    #[instrument(skip(self, release), fields(version = %release.version))]
    async fn commit_release(&self, name: &str, release: Release) -> Result<Project> {
        let _name = self.name_locks.lock(name.to_string()).await;

        loop {
            let found = self.find_by_name(name)?;
            let id = found
                .as_ref()
                .map(|project| project.id.clone())
                .unwrap_or_else(ProjectId::generate);
            let _id = self.id_locks.lock(id.clone()).await;

            let current = match found {
                Some(_) => match self.load_project(&id)? {
                    Some(project) if project.name == name => Some(project),
                    // Renamed by an upsert while we waited for the id lock.
                    _ => continue,
                },
                None => {
                    debug!(id = %id, "Creating project");
                    None
                }
            };

            let project = merge_release(current, id, name, release);
            self.write(&project)?;
            return Ok(project);
        }
    }
}

/// Saves a record atomically, creating the parent directory if needed.
pub fn save_record_atomic(path: &Path, record: &ProjectRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| unavailable(parent, e))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(record).map_err(|e| CatalogError::Corrupt {
        id: record.project.id.to_string(),
        reason: e.to_string(),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| unavailable(&tmp_path, e))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| unavailable(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| unavailable(path, e))?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent).map_err(|e| unavailable(parent, e))?;
    }

    Ok(())
}

/// Loads a record, returning `None` if the file doesn't exist.
pub fn load_record(path: &Path) -> Result<Option<ProjectRecord>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unavailable(path, e)),
    };

    let corrupt = |reason: String| CatalogError::Corrupt {
        id: path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default(),
        reason,
    };

    let record: ProjectRecord = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    if record.schema_version != SCHEMA_VERSION {
        return Err(corrupt(format!(
            "schema version {} (expected {})",
            record.schema_version, SCHEMA_VERSION
        )));
    }

    Ok(Some(record))
}

/// Syncs a directory so that renames inside it survive a power loss.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

fn unavailable(path: &Path, e: io::Error) -> CatalogError {
    CatalogError::Unavailable(format!("{}: {}", path.display(), e))
}
