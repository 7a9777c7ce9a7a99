//! ID generation utilities with prefix support
//!
//! IDs are generated with at least 96 bits of entropy and are URL-safe. The
//! prefix makes the entity type visible in logs (`acct_`, `sess_`, `ipb_`).

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

/// Generate a prefixed ID with 96 bits of entropy.
///
/// The ID format is `{prefix}_{random}` where the random part is URL-safe
/// base64 without padding.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Validate that a prefixed ID has the expected format.
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(rest) = id
        .strip_prefix(expected_prefix)
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(rest) {
        Ok(decoded) => decoded.len() >= 12,
        Err(_) => false,
    }
}
