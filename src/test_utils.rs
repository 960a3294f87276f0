//! Shared test utilities: a scripted builder and property-test generators.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use crate::build::{BuildError, Builder};
use crate::types::{Binary, ReleaseRequest};

/// Builder that records its calls and produces one fake artifact per build.
///
/// The artifact is named `<name>-<version>.tar.gz` with checksum
/// [`ScriptedBuilder::CHECKSUM`]. Versions registered with
/// [`failing_on`](Self::failing_on) fail with [`BuildError::CommandFailed`].
#[derive(Debug, Default)]
pub struct ScriptedBuilder {
    failing: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<(String, String, String)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedBuilder {
    pub const CHECKSUM: &'static str = "feedface";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, version: impl Into<String>) -> Self {
        self.failing.insert(version.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(name, url, version)` of every build started so far.
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Most builds ever observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Builder for ScriptedBuilder {
    async fn build(&self, name: &str, url: &str, version: &str) -> Result<Vec<Binary>, BuildError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), url.to_string(), version.to_string()));

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(version) {
            return Err(BuildError::CommandFailed {
                command: "scripted build".to_string(),
                stderr: format!("version {version} is scripted to fail"),
            });
        }

        Ok(vec![Binary::new(
            format!("{name}-{version}.tar.gz"),
            Self::CHECKSUM,
        )])
    }
}

pub fn arb_project_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(String::from)
}

pub fn arb_version() -> impl Strategy<Value = String> {
    (0u32..10, 0u32..20, 0u32..50).prop_map(|(major, minor, patch)| format!("v{major}.{minor}.{patch}"))
}

/// Requests that pass validation.
pub fn arb_release_request() -> impl Strategy<Value = ReleaseRequest> {
    (arb_project_name(), arb_version()).prop_map(|(name, version)| {
        let url = format!("https://git.example.com/group/{name}.git");
        ReleaseRequest::new(name, url, version)
    })
}
