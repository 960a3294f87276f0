//! Core domain types for the release service.
//!
//! Everything that crosses a module boundary (requests, queued messages,
//! catalog records and their read-side projections) lives here.

pub mod ids;
pub mod release;
pub mod view;

pub use ids::{CorrelationId, ProjectId};
pub use release::{Binary, Project, Release, ReleaseMessage, ReleaseRequest};
pub use view::{BinaryUI, ProjectUI, ReleaseUI};
