//! Typed webhook payloads.
//!
//! Only the fields needed to decide whether a delivery is an actionable tag
//! push are modelled; everything else in the provider payload is ignored.

use serde::{Deserialize, Serialize};

/// Prefix of fully-qualified tag references.
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// Strips the `refs/tags/` prefix from a tag reference.
///
/// References without the prefix are returned unchanged.
pub fn tag_name(reference: &str) -> &str {
    reference.strip_prefix(TAG_REF_PREFIX).unwrap_or(reference)
}

/// GitLab "Tag Push Hook" payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitlabTagPushEvent {
    /// `"tag_push"` for tag pushes.
    pub event_name: String,

    /// Full reference, e.g. `refs/tags/v1.0.0`.
    #[serde(rename = "ref")]
    pub reference: String,

    /// Commits included in the push. Zero for tag deletions.
    #[serde(default)]
    pub total_commits_count: i64,

    pub project: GitlabProject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitlabProject {
    pub name: String,
    /// e.g. `group/subgroup/app`.
    pub path_with_namespace: String,
}

/// GitHub `push` event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubPushEvent {
    #[serde(rename = "ref")]
    pub reference: String,

    /// Whether the push created the reference.
    #[serde(default)]
    pub created: bool,

    /// Whether the push deleted the reference.
    #[serde(default)]
    pub deleted: bool,

    pub repository: GithubRepository,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRepository {
    pub name: String,
    /// e.g. `octocat/hello-world`.
    pub full_name: String,
}
