//! Rabbit - a release builder driven by tag push webhooks.
//!
//! Tag pushes (or direct API calls) become release requests, which a worker
//! pool builds into checksummed binaries and records in a project catalog
//! that is served back over HTTP.

pub mod aggregate;
pub mod build;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod locks;
pub mod server;
pub mod types;
pub mod validation;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;
