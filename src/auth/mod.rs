//! # Authentication
//!
//! Single-account password check plus a fixed-size table of login sessions.
//!
//! - [`hash_password`] - lower-case hex SHA-256 of a plaintext (no salt)
//! - [`generate_token`] - 16 random bytes from the OS RNG as 32 hex chars
//! - [`SessionAuthenticator`] - login / validate / logout / expiry
//! - [`Clock`] - time source, swappable for tests
//!
//! The stored credential is re-read from the [`ConfigManager`] on every
//! verification, so a password change applies to the next login without a
//! restart.
//!
//! Note: the hash is unsalted and there is no rate limiting beyond the
//! session slot count.
//!
//! [`ConfigManager`]: crate::settings::ConfigManager

pub mod clock;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session::{Session, SessionAuthenticator};

use std::fmt::Write;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::settings::DEFAULT_PASSWORD_HASH;

pub const DEFAULT_SESSION_CAPACITY: usize = 5;
pub const TOKEN_BYTES: usize = 16;

/// Lower-case hex SHA-256 digest of `plain` (64 chars).
pub fn hash_password(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fresh session token: 32 lower-case hex chars from the OS RNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    token_hex(&bytes)
}

/// Check the hash implementation against the factory credential.
pub fn self_test() -> bool {
    hash_password("123456") == DEFAULT_PASSWORD_HASH
}

fn token_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_known_vectors() {
        assert_eq!(hash_password("123456"), DEFAULT_PASSWORD_HASH);
        assert_eq!(
            hash_password(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(self_test());
    }

    #[test]
    fn tokens_are_32_lowercase_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f')));
        assert_ne!(a, b);
    }
}
