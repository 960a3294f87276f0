//! Webhook handling for source control providers.
//!
//! This module provides:
//! - Shared-secret token checks and HMAC-SHA256 signature verification
//! - Typed tag push payloads for GitLab and GitHub
//! - Classification of deliveries into actionable release requests

pub mod events;
pub mod filter;
pub mod signature;

pub use filter::{
    FilterError, FilterOutcome, IgnoreReason, Provider, WebhookHeaders, classify,
    classify_github, classify_gitlab,
};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
    verify_token,
};
