//! Bounded worker pool.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{ReleaseSource, ReleaseWorker};
use crate::build::Builder;
use crate::catalog::Catalog;

/// Runs up to `size` release builds at a time.
pub struct WorkerPool<B, C> {
    worker: Arc<ReleaseWorker<B, C>>,
    size: usize,
}

impl<B, C> WorkerPool<B, C>
where
    B: Builder + 'static,
    C: Catalog + 'static,
{
    pub fn new(worker: ReleaseWorker<B, C>, size: usize) -> Self {
        WorkerPool {
            worker: Arc::new(worker),
            size: size.max(1),
        }
    }

    /// Consumes messages until the source closes or `shutdown` fires, then
    /// waits for in-flight builds.
    ///
    /// A message is only taken from the source once a slot is free, so a
    /// saturated pool leaves messages in the transport.
    pub async fn run(self, mut source: ReleaseSource, shutdown: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.size));
        let mut in_flight = JoinSet::new();
        info!(workers = self.size, "Worker pool started");

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let payload = tokio::select! {
                () = shutdown.cancelled() => break,
                payload = source.next() => match payload {
                    Some(payload) => payload,
                    None => {
                        info!("Release source closed");
                        break;
                    }
                },
            };

            let worker = Arc::clone(&self.worker);
            in_flight.spawn(async move {
                worker.handle(&payload).await;
                drop(permit);
            });

            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }

        info!(in_flight = in_flight.len(), "Worker pool stopping");
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileCatalog;
    use crate::test_utils::ScriptedBuilder;
    use crate::types::{ReleaseMessage, ReleaseRequest};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn payload(version: &str) -> Vec<u8> {
        ReleaseMessage::new(ReleaseRequest::new("app", "https://x/app.git", version), None)
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn drains_source_and_records_every_release() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(FileCatalog::open(dir.path()).unwrap());
        let pool = WorkerPool::new(ReleaseWorker::new(ScriptedBuilder::new(), Arc::clone(&catalog)), 3);

        let (tx, rx) = mpsc::channel(16);
        for i in 0..10 {
            tx.send(payload(&format!("v{i}"))).await.unwrap();
        }
        drop(tx);

        pool.run(ReleaseSource::Channel(rx), CancellationToken::new()).await;

        let projects = catalog.list().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].releases.len(), 10);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(FileCatalog::open(dir.path()).unwrap());
        let worker = ReleaseWorker::new(
            ScriptedBuilder::new().with_delay(Duration::from_millis(20)),
            Arc::clone(&catalog),
        );
        let pool = WorkerPool::new(worker, 2);
        let observed = Arc::clone(&pool.worker);

        let (tx, rx) = mpsc::channel(16);
        for i in 0..8 {
            tx.send(payload(&format!("v{i}"))).await.unwrap();
        }
        drop(tx);

        pool.run(ReleaseSource::Channel(rx), CancellationToken::new()).await;

        assert_eq!(observed.builder().calls().len(), 8);
        assert!(observed.builder().peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_builds() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(FileCatalog::open(dir.path()).unwrap());
        let worker = ReleaseWorker::new(
            ScriptedBuilder::new().with_delay(Duration::from_millis(100)),
            Arc::clone(&catalog),
        );
        let pool = WorkerPool::new(worker, 1);
        let observed = Arc::clone(&pool.worker);
        let shutdown = CancellationToken::new();

        let (tx, rx) = mpsc::channel(4);
        tx.send(payload("v1")).await.unwrap();
        let running = tokio::spawn(pool.run(ReleaseSource::Channel(rx), shutdown.clone()));

        // Wait for the build to start, then ask the pool to stop.
        while observed.builder().calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(payload("v2")).await.unwrap();
        shutdown.cancel();
        running.await.unwrap();

        let projects = catalog.list().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].releases.keys().collect::<Vec<_>>(), vec!["v1"]);
        assert_eq!(observed.builder().calls().len(), 1);
    }
}
