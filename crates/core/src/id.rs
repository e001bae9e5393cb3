//! Opaque string id minting.
//!
//! Ids are plain strings on the wire (workflow files, execution rows, log
//! entries); this module is the single place that decides what they look
//! like.

use uuid::Uuid;

/// Mint a fresh opaque id.
#[must_use]
pub fn fresh() -> String {
    Uuid::new_v4().to_string()
}

/// Mint a fresh id with a short prefix, e.g. `exec-4f1c…`.
#[must_use]
pub fn prefixed(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}
