//! Shared-secret checks for webhook deliveries.
//!
//! Two flavours of the same shared secret are supported:
//!
//! - GitLab sends the secret itself in `X-Gitlab-Token`; it is compared
//!   byte-for-byte with the configured value.
//! - GitHub signs the payload with HMAC-SHA256 and sends
//!   `X-Hub-Signature-256: sha256=<hex>`.
//!
//! Both comparisons run in constant time with respect to the secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compares a presented token with the configured secret.
///
/// Returns `true` only when both are exactly equal. The comparison does not
/// short-circuit on the first differing byte.
///
/// # Examples
///
/// ```
/// use rabbit::webhooks::verify_token;
///
/// assert!(verify_token(b"s3cret", b"s3cret"));
/// assert!(!verify_token(b"s3creT", b"s3cret"));
/// assert!(!verify_token(b"s3cret ", b"s3cret"));
/// ```
pub fn verify_token(presented: &[u8], secret: &[u8]) -> bool {
    if presented.len() != secret.len() {
        return false;
    }

    presented
        .iter()
        .zip(secret)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Parses a GitHub signature header (e.g., "sha256=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload.
///
/// Returns `None` only if the MAC rejects the key, which HMAC never does.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Formats a signature as a GitHub-style header value (`sha256=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a GitHub webhook signature against the payload and secret.
///
/// # Examples
///
/// ```
/// use rabbit::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let payload = b"{\"ref\":\"refs/tags/v1\"}";
/// let header = format_signature_header(&compute_signature(payload, b"key").unwrap());
///
/// assert!(verify_signature(payload, &header, b"key"));
/// assert!(!verify_signature(payload, &header, b"other"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}
