//! One-time activation codes and the retry policy around them.

use rand::{rngs::OsRng, Rng};

/// Wrong guesses allowed before the stored code is invalidated and the user
/// has to request a new one.
pub const MAX_ATTEMPTS: i32 = 5;

/// Uniform random six-digit code from the OS entropy source.
#[must_use]
pub fn generate_code() -> i32 {
    OsRng.gen_range(100_000..=999_999)
}

/// A code only matches while one is outstanding.
#[must_use]
pub fn code_matches(supplied: i32, stored: Option<i32>) -> bool {
    stored == Some(supplied)
}

#[must_use]
pub fn attempts_exhausted(attempts: i32) -> bool {
    attempts >= MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert!((100_000..=999_999).contains(&code));
        }
    }

    #[test]
    fn code_matches_only_stored_value() {
        assert!(code_matches(123_456, Some(123_456)));
        assert!(!code_matches(123_456, Some(654_321)));
        assert!(!code_matches(123_456, None));
    }

    #[test]
    fn attempts_exhausted_at_limit() {
        assert!(!attempts_exhausted(0));
        assert!(!attempts_exhausted(MAX_ATTEMPTS - 1));
        assert!(attempts_exhausted(MAX_ATTEMPTS));
        assert!(attempts_exhausted(MAX_ATTEMPTS + 1));
    }
}
