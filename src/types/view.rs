//! Read-side projections served by the project listing endpoint.
//!
//! None of these are persisted; they are rebuilt from the catalog on every
//! read by [`crate::aggregate`].

use std::collections::BTreeMap;

use serde::Serialize;

/// A binary with its public download address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryUI {
    pub url: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseUI {
    pub binaries: Vec<BinaryUI>,
}

/// A project as presented to API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUI {
    /// Title-cased display name.
    pub name: String,

    /// Version of the most recently created release, empty if none.
    pub latest_release: String,

    /// Currently the same as `latest_release`.
    pub current_release: String,

    pub releases: BTreeMap<String, ReleaseUI>,
}
