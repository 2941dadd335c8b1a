//! API key and capability key generation.
//!
//! Plaintext keys are returned to the caller exactly once; only the SHA-256
//! hex digest is ever stored.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::SECRET_KEY_LEN;

/// Generate a cryptographically random 32-char alphanumeric key
#[must_use]
pub fn generate_api_key() -> String {
    generate_secret_key()
}

/// Generate a 32-char alphanumeric secret, used for API keys and per-trace
/// feedback capability keys
#[must_use]
pub fn generate_secret_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_KEY_LEN)
        .map(char::from)
        .collect()
}

/// One-way hash of an API key for storage and lookup
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_have_expected_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn keys_are_unique() {
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn hash_is_deterministic_and_hides_key() {
        let key = "aBcDeFgH1234567890aBcDeFgH123456";
        let hash = hash_api_key(key);
        assert_eq!(hash, hash_api_key(key));
        assert_eq!(hash.len(), 64);
        assert!(!hash.contains(key));
    }
}
