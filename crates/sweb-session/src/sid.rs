//! Session identifier generation.

use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of bytes drawn from the OS random source per identifier.
const RANDOM_LEN: usize = 12;

/// Length of a generated identifier in hex characters.
pub const SESSION_ID_LEN: usize = 64;

/// Generate a new session identifier.
///
/// The identifier is the hex-encoded SHA-256 of the client's remote address,
/// the current nanosecond timestamp and 12 bytes from the OS random source.
/// Fails with [`Error::Entropy`] if the random source is unavailable; there is
/// no fallback to weaker entropy.
pub fn new_session_id(remote_addr: &str) -> Result<String> {
    let mut random = [0u8; RANDOM_LEN];
    OsRng
        .try_fill_bytes(&mut random)
        .map_err(|e| Error::Entropy(e.to_string()))?;

    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(remote_addr.as_bytes());
    hasher.update(nanos.to_string().as_bytes());
    hasher.update(random);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_fixed_length_hex() {
        let sid = new_session_id("127.0.0.1:5000").unwrap();
        assert_eq!(sid.len(), SESSION_ID_LEN);
        assert!(sid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_unique_for_same_client() {
        let ids: HashSet<String> = (0..1000)
            .map(|_| new_session_id("10.0.0.1:443").unwrap())
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_empty_remote_addr() {
        let sid = new_session_id("").unwrap();
        assert_eq!(sid.len(), SESSION_ID_LEN);
    }
}
