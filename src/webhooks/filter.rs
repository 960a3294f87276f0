//! Classification of inbound webhook deliveries.
//!
//! Every delivery is authenticated first, then decoded, then checked for
//! being an actionable tag push. Only actionable deliveries produce a
//! [`ReleaseRequest`]; everything else is either an error for the caller
//! (bad secret, undecodable body) or a successful no-op.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::types::ReleaseRequest;

use super::events::{GithubPushEvent, GitlabTagPushEvent, TAG_REF_PREFIX, tag_name};
use super::signature::{verify_signature, verify_token};

/// Source control provider a webhook came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gitlab,
    Github,
}

impl Provider {
    /// Header naming the event kind.
    pub fn event_header(self) -> &'static str {
        match self {
            Provider::Gitlab => "x-gitlab-event",
            Provider::Github => "x-github-event",
        }
    }

    /// Header carrying the shared secret (GitLab) or payload signature (GitHub).
    pub fn secret_header(self) -> &'static str {
        match self {
            Provider::Gitlab => "x-gitlab-token",
            Provider::Github => "x-hub-signature-256",
        }
    }

    /// Event header value that marks a tag push.
    pub fn tag_push_event(self) -> &'static str {
        match self {
            Provider::Gitlab => "Tag Push Hook",
            Provider::Github => "push",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gitlab => write!(f, "gitlab"),
            Provider::Github => write!(f, "github"),
        }
    }
}

/// The headers the filter looks at, already extracted from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub event: Option<String>,
    pub secret: Option<String>,
}

impl WebhookHeaders {
    pub fn new(event: Option<impl Into<String>>, secret: Option<impl Into<String>>) -> Self {
        WebhookHeaders {
            event: event.map(Into::into),
            secret: secret.map(Into::into),
        }
    }
}

/// Errors that end processing of a delivery.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Missing or mismatched shared secret.
    #[error("webhook secret mismatch")]
    Unauthorized,

    /// Payload could not be decoded as the provider's event.
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Why a well-formed delivery was not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event header is not the provider's tag push label.
    EventHeader,
    /// The payload describes something other than a tag push.
    NotTagPush,
    /// GitLab reported no commits (tag deletion).
    NoCommits,
    /// GitHub reported a deletion or an update of an existing tag.
    NotCreated,
}

/// Result of a successful classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The delivery describes a release to build.
    Actionable(ReleaseRequest),
    /// Nothing to do; callers answer with success.
    Ignored(IgnoreReason),
}

/// Classifies a delivery from the given provider.
pub fn classify(
    provider: Provider,
    settings: &ProviderConfig,
    headers: &WebhookHeaders,
    body: &[u8],
) -> Result<FilterOutcome, FilterError> {
    match provider {
        Provider::Gitlab => classify_gitlab(settings, headers, body),
        Provider::Github => classify_github(settings, headers, body),
    }
}

/// Classifies a GitLab delivery.
///
/// Actionable when the secret matches (if configured), the payload's
/// `event_name` is `tag_push`, the `X-Gitlab-Event` header is
/// `Tag Push Hook`, and at least one commit was pushed.
pub fn classify_gitlab(
    settings: &ProviderConfig,
    headers: &WebhookHeaders,
    body: &[u8],
) -> Result<FilterOutcome, FilterError> {
    if let Some(secret) = settings.secret() {
        let presented = headers.secret.as_deref().unwrap_or_default();
        if !verify_token(presented.as_bytes(), secret) {
            return Err(FilterError::Unauthorized);
        }
    }

    let event: GitlabTagPushEvent = serde_json::from_slice(body)?;

    if event.event_name != "tag_push" {
        return Ok(FilterOutcome::Ignored(IgnoreReason::NotTagPush));
    }
    if headers.event.as_deref() != Some(Provider::Gitlab.tag_push_event()) {
        return Ok(FilterOutcome::Ignored(IgnoreReason::EventHeader));
    }
    if event.total_commits_count <= 0 {
        return Ok(FilterOutcome::Ignored(IgnoreReason::NoCommits));
    }

    let request = ReleaseRequest::new(
        event.project.name,
        settings.clone_url(&event.project.path_with_namespace),
        tag_name(&event.reference),
    );
    debug!(name = %request.name, version = %request.version, "Actionable GitLab tag push");

    Ok(FilterOutcome::Actionable(request))
}

/// Classifies a GitHub delivery.
///
/// Actionable when the HMAC signature verifies (if a secret is configured),
/// the `X-GitHub-Event` header is `push`, the reference is a tag, and the
/// push created it.
pub fn classify_github(
    settings: &ProviderConfig,
    headers: &WebhookHeaders,
    body: &[u8],
) -> Result<FilterOutcome, FilterError> {
    if let Some(secret) = settings.secret() {
        let signature = headers.secret.as_deref().unwrap_or_default();
        if !verify_signature(body, signature, secret) {
            return Err(FilterError::Unauthorized);
        }
    }

    let event: GithubPushEvent = serde_json::from_slice(body)?;

    if headers.event.as_deref() != Some(Provider::Github.tag_push_event()) {
        return Ok(FilterOutcome::Ignored(IgnoreReason::EventHeader));
    }
    if !event.reference.starts_with(TAG_REF_PREFIX) {
        return Ok(FilterOutcome::Ignored(IgnoreReason::NotTagPush));
    }
    if !event.created || event.deleted {
        return Ok(FilterOutcome::Ignored(IgnoreReason::NotCreated));
    }

    let request = ReleaseRequest::new(
        event.repository.name,
        settings.clone_url(&event.repository.full_name),
        tag_name(&event.reference),
    );
    debug!(name = %request.name, version = %request.version, "Actionable GitHub tag push");

    Ok(FilterOutcome::Actionable(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloneWith;
    use crate::webhooks::signature::{compute_signature, format_signature_header};
    use proptest::prelude::*;
    use serde_json::json;

    fn gitlab_settings() -> ProviderConfig {
        ProviderConfig::default().with_templates(
            "https://gitlab.com/[.RepoFullName].git",
            "git@gitlab.com:[.RepoFullName].git",
        )
    }

    fn gitlab_body(event_name: &str, reference: &str, commits: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object_kind": event_name,
            "event_name": event_name,
            "ref": reference,
            "total_commits_count": commits,
            "project": {
                "name": "app",
                "path_with_namespace": "group/app"
            }
        }))
        .unwrap()
    }

    fn tag_push_headers(token: Option<&str>) -> WebhookHeaders {
        WebhookHeaders::new(Some("Tag Push Hook"), token)
    }

    // ─── GitLab ───

    #[test]
    fn gitlab_tag_push_is_actionable() {
        let outcome = classify_gitlab(
            &gitlab_settings(),
            &tag_push_headers(None),
            &gitlab_body("tag_push", "refs/tags/v1.2.0", 3),
        )
        .unwrap();

        assert_eq!(
            outcome,
            FilterOutcome::Actionable(ReleaseRequest::new(
                "app",
                "https://gitlab.com/group/app.git",
                "v1.2.0"
            ))
        );
    }

    #[test]
    fn gitlab_ssh_clone_template() {
        let settings = gitlab_settings().with_clone_with(CloneWith::Ssh);
        let outcome = classify_gitlab(
            &settings,
            &tag_push_headers(None),
            &gitlab_body("tag_push", "refs/tags/v1", 1),
        )
        .unwrap();

        let FilterOutcome::Actionable(request) = outcome else {
            panic!("expected actionable outcome, got {outcome:?}");
        };
        assert_eq!(request.url, "git@gitlab.com:group/app.git");
    }

    #[test]
    fn gitlab_wrong_token_is_unauthorized() {
        let settings = gitlab_settings().with_secret("s3cret");
        let result = classify_gitlab(
            &settings,
            &tag_push_headers(Some("s3creT")),
            &gitlab_body("tag_push", "refs/tags/v1", 1),
        );

        assert!(matches!(result, Err(FilterError::Unauthorized)));
    }

    #[test]
    fn gitlab_missing_token_is_unauthorized() {
        let settings = gitlab_settings().with_secret("s3cret");
        let result = classify_gitlab(
            &settings,
            &tag_push_headers(None),
            &gitlab_body("tag_push", "refs/tags/v1", 1),
        );

        assert!(matches!(result, Err(FilterError::Unauthorized)));
    }

    #[test]
    fn gitlab_matching_token_proceeds() {
        let settings = gitlab_settings().with_secret("s3cret");
        let result = classify_gitlab(
            &settings,
            &tag_push_headers(Some("s3cret")),
            &gitlab_body("tag_push", "refs/tags/v1", 1),
        );

        assert!(matches!(result, Ok(FilterOutcome::Actionable(_))));
    }

    #[test]
    fn gitlab_secret_checked_before_parsing() {
        let settings = gitlab_settings().with_secret("s3cret");
        let result = classify_gitlab(&settings, &tag_push_headers(Some("nope")), b"not json");

        assert!(matches!(result, Err(FilterError::Unauthorized)));
    }

    #[test]
    fn gitlab_malformed_body() {
        let result = classify_gitlab(&gitlab_settings(), &tag_push_headers(None), b"{\"ref\":");
        assert!(matches!(result, Err(FilterError::Malformed(_))));
    }

    #[test]
    fn gitlab_push_hook_is_ignored() {
        let outcome = classify_gitlab(
            &gitlab_settings(),
            &WebhookHeaders::new(Some("Push Hook"), None::<String>),
            &gitlab_body("push", "refs/heads/main", 2),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::NotTagPush));
    }

    #[test]
    fn gitlab_header_mismatch_is_ignored() {
        let outcome = classify_gitlab(
            &gitlab_settings(),
            &WebhookHeaders::new(Some("Push Hook"), None::<String>),
            &gitlab_body("tag_push", "refs/tags/v1", 2),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::EventHeader));
    }

    #[test]
    fn gitlab_zero_commits_is_ignored() {
        let outcome = classify_gitlab(
            &gitlab_settings(),
            &tag_push_headers(None),
            &gitlab_body("tag_push", "refs/tags/v1", 0),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::NoCommits));
    }

    // ─── GitHub ───

    fn github_body(reference: &str, created: bool, deleted: bool) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ref": reference,
            "created": created,
            "deleted": deleted,
            "repository": {
                "name": "hello-world",
                "full_name": "octocat/hello-world"
            }
        }))
        .unwrap()
    }

    fn github_settings() -> ProviderConfig {
        ProviderConfig::default().with_templates(
            "https://github.com/[.RepoFullName].git",
            "git@github.com:[.RepoFullName].git",
        )
    }

    #[test]
    fn github_created_tag_is_actionable() {
        let outcome = classify_github(
            &github_settings(),
            &WebhookHeaders::new(Some("push"), None::<String>),
            &github_body("refs/tags/v2.0.0", true, false),
        )
        .unwrap();

        assert_eq!(
            outcome,
            FilterOutcome::Actionable(ReleaseRequest::new(
                "hello-world",
                "https://github.com/octocat/hello-world.git",
                "v2.0.0"
            ))
        );
    }

    #[test]
    fn github_signed_delivery_is_accepted() {
        let settings = github_settings().with_secret("key");
        let body = github_body("refs/tags/v2.0.0", true, false);
        let header = format_signature_header(&compute_signature(&body, b"key").unwrap());

        let outcome = classify_github(
            &settings,
            &WebhookHeaders::new(Some("push"), Some(header)),
            &body,
        )
        .unwrap();

        assert!(matches!(outcome, FilterOutcome::Actionable(_)));
    }

    #[test]
    fn github_bad_signature_is_unauthorized() {
        let settings = github_settings().with_secret("key");
        let body = github_body("refs/tags/v2.0.0", true, false);
        let header = format_signature_header(&compute_signature(&body, b"other").unwrap());

        let result = classify_github(
            &settings,
            &WebhookHeaders::new(Some("push"), Some(header)),
            &body,
        );

        assert!(matches!(result, Err(FilterError::Unauthorized)));
    }

    #[test]
    fn github_branch_push_is_ignored() {
        let outcome = classify_github(
            &github_settings(),
            &WebhookHeaders::new(Some("push"), None::<String>),
            &github_body("refs/heads/main", false, false),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::NotTagPush));
    }

    #[test]
    fn github_tag_deletion_is_ignored() {
        let outcome = classify_github(
            &github_settings(),
            &WebhookHeaders::new(Some("push"), None::<String>),
            &github_body("refs/tags/v1", false, true),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::NotCreated));
    }

    #[test]
    fn github_other_event_is_ignored() {
        let outcome = classify_github(
            &github_settings(),
            &WebhookHeaders::new(Some("create"), None::<String>),
            &github_body("refs/tags/v1", true, false),
        )
        .unwrap();

        assert_eq!(outcome, FilterOutcome::Ignored(IgnoreReason::EventHeader));
    }

    #[test]
    fn classify_routes_by_provider() {
        let outcome = classify(
            Provider::Gitlab,
            &gitlab_settings(),
            &tag_push_headers(None),
            &gitlab_body("tag_push", "refs/tags/v9", 1),
        )
        .unwrap();

        assert!(matches!(outcome, FilterOutcome::Actionable(r) if r.version == "v9"));
    }

    proptest! {
        /// Property: derived versions never carry the `refs/tags/` prefix.
        #[test]
        fn prop_version_never_has_tag_prefix(tag in "[a-zA-Z0-9._-]{1,20}") {
            let reference = format!("refs/tags/{tag}");
            let outcome = classify_gitlab(
                &gitlab_settings(),
                &tag_push_headers(None),
                &gitlab_body("tag_push", &reference, 1),
            )
            .unwrap();

            match outcome {
                FilterOutcome::Actionable(request) => {
                    prop_assert!(!request.version.starts_with(TAG_REF_PREFIX));
                    prop_assert_eq!(request.version, tag);
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
        }

        /// Property: non-tag-push or zero-commit events are always ignored.
        #[test]
        fn prop_non_actionable_events_ignored(
            event_name in "[a-z_]{1,12}",
            commits in -5i64..=5,
            header in prop_oneof![Just("Tag Push Hook"), Just("Push Hook"), Just("Note Hook")],
        ) {
            prop_assume!(event_name != "tag_push" || commits <= 0 || header != "Tag Push Hook");

            let outcome = classify_gitlab(
                &gitlab_settings(),
                &WebhookHeaders::new(Some(header), None::<String>),
                &gitlab_body(&event_name, "refs/tags/v1", commits),
            )
            .unwrap();

            prop_assert!(matches!(outcome, FilterOutcome::Ignored(_)));
        }
    }
}
