//! Worker pool turning release messages into catalog entries.
//!
//! # Architecture
//!
//! ```text
//!  ReleaseSource ──► WorkerPool (N slots) ──► ReleaseWorker::handle
//!   (mpsc or          takes a message only      decode → build → commit
//!    Redis SUBSCRIBE)  when a slot is free
//! ```
//!
//! - Builds run concurrently up to the pool size; there is no ordering
//!   guarantee between messages.
//! - A failed build is logged and dropped. Nothing is retried.
//! - A dropped Redis subscription is re-established with backoff; messages
//!   published while it is down are lost, as pub/sub is at-most-once.
//! - On shutdown the pool stops taking messages and waits for in-flight
//!   builds, which are never cancelled once started.
//!
//! # Module Structure
//!
//! - [`source`]: Receiving side of either transport
//! - [`worker`]: Per-message processing
//! - [`pool`]: Bounded concurrency and shutdown

pub mod pool;
pub mod source;
#[allow(clippy::module_inception)]
pub mod worker;

pub use pool::WorkerPool;
pub use source::{ReleaseSource, Subscription};
pub use worker::{ReleaseWorker, WorkerError};
