//! Release request, queued message, and catalog record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, ProjectId};

/// A request to build and catalog one release of a project.
///
/// The JSON field names (`Name`, `URL`, `Version`) are the public wire
/// format of the direct release API and of the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Short project name, e.g. `"rabbit"`.
    #[serde(rename = "Name", default)]
    pub name: String,

    /// Clone URL of the source repository.
    #[serde(rename = "URL", default)]
    pub url: String,

    /// Tag to build, e.g. `"v1.2.0"`.
    #[serde(rename = "Version", default)]
    pub version: String,
}

impl ReleaseRequest {
    pub fn new(name: impl Into<String>, url: impl Into<String>, version: impl Into<String>) -> Self {
        ReleaseRequest {
            name: name.into(),
            url: url.into(),
            version: version.into(),
        }
    }
}

/// The message carried by either dispatch transport.
///
/// Serialises to the canonical `ReleaseRequest` JSON object, extended with a
/// `CorrelationID` key only when the producer had one. Any bare
/// `ReleaseRequest` document therefore decodes as a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMessage {
    #[serde(flatten)]
    pub request: ReleaseRequest,

    #[serde(
        rename = "CorrelationID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<CorrelationId>,
}

impl ReleaseMessage {
    pub fn new(request: ReleaseRequest, correlation_id: Option<CorrelationId>) -> Self {
        ReleaseMessage {
            request,
            correlation_id,
        }
    }

    /// Encodes the message as JSON bytes for a transport.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes a message received from a transport.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A single built artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binary {
    pub file_name: String,

    /// Hex-encoded SHA-256 of the file contents.
    pub checksum: String,
}

impl Binary {
    pub fn new(file_name: impl Into<String>, checksum: impl Into<String>) -> Self {
        Binary {
            file_name: file_name.into(),
            checksum: checksum.into(),
        }
    }
}

/// One version of a project and the binaries built for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub binaries: Vec<Binary>,
}

impl Release {
    pub fn new(version: impl Into<String>, created_at: DateTime<Utc>, binaries: Vec<Binary>) -> Self {
        Release {
            version: version.into(),
            created_at,
            binaries,
        }
    }
}

/// A project and every release recorded for it.
///
/// This is the unit of storage: the catalog always reads and writes whole
/// projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,

    /// Releases keyed by version string.
    #[serde(default)]
    pub releases: BTreeMap<String, Release>,
}

impl Project {
    /// Creates an empty project with a freshly generated identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Project::with_id(ProjectId::generate(), name)
    }

    pub fn with_id(id: ProjectId, name: impl Into<String>) -> Self {
        Project {
            id,
            name: name.into(),
            releases: BTreeMap::new(),
        }
    }

    /// Records a release, replacing any previous release of the same version.
    ///
    /// Returns the replaced release, if there was one.
    pub fn record_release(&mut self, release: Release) -> Option<Release> {
        self.releases.insert(release.version.clone(), release)
    }
}
