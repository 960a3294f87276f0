//! Per-message release processing.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use crate::build::{BuildError, Builder};
use crate::catalog::{Catalog, CatalogError};
use crate::locks::KeyedLocks;
use crate::types::{Project, Release, ReleaseMessage};
use crate::validation::{ValidationError, validate};

/// Errors that can occur while processing one release message.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The payload is not a release message.
    #[error("undecodable release message: {0}")]
    Decode(#[from] serde_json::Error),

    /// The message decoded but is missing a field.
    #[error("invalid release message: {0}")]
    Invalid(#[from] ValidationError),

    /// The builder failed.
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    /// The build succeeded but could not be recorded.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The release subscription could not be established.
    #[error("failed to subscribe to release channel: {0}")]
    Subscribe(String),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Builds a release and records it in the catalog.
///
/// Builds of the same project version are serialised from the start of the
/// build through the catalog commit, so the recorded checksums always
/// describe the files on disk.
#[derive(Debug)]
pub struct ReleaseWorker<B, C> {
    builder: B,
    catalog: Arc<C>,
    releases: KeyedLocks<(String, String)>,
}

impl<B: Builder, C: Catalog> ReleaseWorker<B, C> {
    pub fn new(builder: B, catalog: Arc<C>) -> Self {
        ReleaseWorker {
            builder,
            catalog,
            releases: KeyedLocks::default(),
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Processes one payload, logging the outcome.
    ///
    /// Never fails: a message that cannot be processed is dropped.
    pub async fn handle(&self, payload: &[u8]) {
        let message = match ReleaseMessage::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping undecodable release message");
                return;
            }
        };

        let span = info_span!(
            "release",
            correlation_id = message.correlation_id.as_ref().map(|id| id.as_str()),
            project = %message.request.name,
            version = %message.request.version,
        );

        async {
            match self.process(message).await {
                Ok(project) => info!(id = %project.id, "Release recorded"),
                Err(e) => error!(error = %e, "Release processing failed"),
            }
        }
        .instrument(span)
        .await
    }

    /// Validates, builds and commits one release.
    pub async fn process(&self, message: ReleaseMessage) -> Result<Project> {
        let request = message.request;
        validate(&request)?;

        let _release = self
            .releases
            .lock((request.name.clone(), request.version.clone()))
            .await;

        info!(url = %request.url, "Building release");
        let binaries = self
            .builder
            .build(&request.name, &request.url, &request.version)
            .await?;

        let release = Release::new(request.version, Utc::now(), binaries);
        Ok(self.catalog.commit_release(&request.name, release).await?)
    }

    /// Decodes and processes one payload.
    pub async fn process_bytes(&self, payload: &[u8]) -> Result<Project> {
        self.process(ReleaseMessage::from_bytes(payload)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileCatalog;
    use crate::test_utils::{ScriptedBuilder, arb_release_request};
    use crate::types::{Binary, CorrelationId, ReleaseRequest};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn message(name: &str, version: &str) -> ReleaseMessage {
        ReleaseMessage::new(
            ReleaseRequest::new(name, format!("https://git.example.com/{name}.git"), version),
            Some(CorrelationId::new("corr-1")),
        )
    }

    fn worker(dir: &std::path::Path, builder: ScriptedBuilder) -> ReleaseWorker<ScriptedBuilder, FileCatalog> {
        ReleaseWorker::new(builder, Arc::new(FileCatalog::open(dir).unwrap()))
    }

    #[tokio::test]
    async fn successful_build_is_committed() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new());

        let project = worker.process(message("app", "v1.0")).await.unwrap();

        assert_eq!(project.name, "app");
        assert_eq!(
            project.releases["v1.0"].binaries,
            vec![Binary::new("app-v1.0.tar.gz", ScriptedBuilder::CHECKSUM)]
        );
        assert_eq!(
            worker.builder().calls(),
            vec![(
                "app".to_string(),
                "https://git.example.com/app.git".to_string(),
                "v1.0".to_string()
            )]
        );
        assert_eq!(worker.catalog.get(&project.id).await.unwrap(), project);
    }

    #[tokio::test]
    async fn failed_build_leaves_catalog_untouched() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new().failing_on("v2"));

        let result = worker.process(message("app", "v2")).await;

        assert!(matches!(result, Err(WorkerError::Build(_))));
        assert!(worker.catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payload_is_not_built() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new());

        let result = worker.process_bytes(b"not json").await;

        assert!(matches!(result, Err(WorkerError::Decode(_))));
        assert!(worker.builder().calls().is_empty());
    }

    #[tokio::test]
    async fn message_with_missing_field_is_not_built() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new());

        let result = worker.process(message("", "v1")).await;

        assert!(matches!(result, Err(WorkerError::Invalid(_))));
        assert!(worker.builder().calls().is_empty());
    }

    #[tokio::test]
    async fn plain_request_json_is_accepted() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new());
        let payload = br#"{"Name":"app","URL":"https://x/app.git","Version":"v3"}"#;

        let project = worker.process_bytes(payload).await.unwrap();
        assert!(project.releases.contains_key("v3"));
    }

    #[tokio::test]
    async fn handle_swallows_failures() {
        let dir = tempdir().unwrap();
        let worker = worker(dir.path(), ScriptedBuilder::new().failing_on("v1"));

        worker.handle(b"garbage").await;
        worker.handle(&message("app", "v1").to_bytes().unwrap()).await;
        worker.handle(&message("app", "v2").to_bytes().unwrap()).await;

        let projects = worker.catalog.list().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].releases.keys().collect::<Vec<_>>(), vec!["v2"]);
    }

    #[tokio::test]
    async fn builds_of_one_version_do_not_overlap() {
        let dir = tempdir().unwrap();
        let builder = ScriptedBuilder::new().with_delay(std::time::Duration::from_millis(30));
        let worker = Arc::new(worker(dir.path(), builder));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.process(message("app", "v1")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(worker.builder().calls().len(), 3);
        assert_eq!(worker.builder().peak_concurrency(), 1);
        assert!(worker.releases.is_empty());
    }

    #[tokio::test]
    async fn builds_of_different_versions_overlap() {
        let dir = tempdir().unwrap();
        let builder = ScriptedBuilder::new().with_delay(std::time::Duration::from_millis(50));
        let worker = Arc::new(worker(dir.path(), builder));

        let first = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.process(message("app", "v1")).await }
        });
        let second = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.process(message("app", "v2")).await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(worker.builder().peak_concurrency(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Property: every valid request ends up as exactly one release under
        /// its project name, however often it is re-ingested.
        #[test]
        fn prop_reingestion_is_idempotent(request in arb_release_request(), repeats in 1usize..4) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let dir = tempdir().unwrap();
            let worker = worker(dir.path(), ScriptedBuilder::new());

            rt.block_on(async {
                for _ in 0..repeats {
                    worker
                        .process(ReleaseMessage::new(request.clone(), None))
                        .await
                        .unwrap();
                }
            });

            let projects = rt.block_on(worker.catalog.list()).unwrap();
            prop_assert_eq!(projects.len(), 1);
            prop_assert_eq!(&projects[0].name, &request.name);
            prop_assert_eq!(projects[0].releases.len(), 1);
            prop_assert!(projects[0].releases.contains_key(&request.version));
        }
    }
}
