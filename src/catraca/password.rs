//! Password policy and bcrypt hashing.

use anyhow::{Context, Result};
use regex::Regex;

/// Accept only passwords that are exactly six ASCII digits.
#[must_use]
pub fn validate(password: &str) -> bool {
    Regex::new(r"^[0-9]{6}$").is_ok_and(|re| re.is_match(password))
}

/// Hash a plaintext password with bcrypt.
pub fn hash(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("failed to hash password")
}

/// Verify a plaintext password against a stored bcrypt hash.
///
/// A malformed stored hash counts as a mismatch rather than an error so a
/// corrupt row can never authenticate.
#[must_use]
pub fn verify(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_six_digits() {
        assert!(validate("123456"));
        assert!(validate("000000"));
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert!(!validate("123"));
        assert!(!validate("1234567"));
        assert!(!validate(""));
    }

    #[test]
    fn validate_rejects_non_digits() {
        assert!(!validate("123abc"));
        assert!(!validate("12 456"));
        assert!(!validate("12345é"));
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hashed = hash("123456").unwrap();
        assert!(verify("123456", &hashed));
        assert!(!verify("654321", &hashed));
    }

    #[test]
    fn verify_malformed_hash_is_mismatch() {
        assert!(!verify("123456", "not-a-bcrypt-hash"));
    }
}
