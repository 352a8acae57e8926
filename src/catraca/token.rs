//! Signed, expiring access and refresh tokens (HS256, shared secret).
//!
//! Tokens are stateless: the server keeps only the signing secret, and every
//! protected call re-resolves the user record from the `email` claim instead
//! of trusting anything else embedded in the token.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

fn issue(email: &str, secret: &SecretString, lifetime: Duration) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + lifetime).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .context("failed to sign token")
}

/// Short-lived token sent in the `Authorization` header.
pub fn issue_access(email: &str, secret: &SecretString, minutes: i64) -> Result<String> {
    issue(email, secret, Duration::minutes(minutes))
}

/// Long-lived token the client exchanges once the access token expires.
pub fn issue_refresh(email: &str, secret: &SecretString, days: i64) -> Result<String> {
    issue(email, secret, Duration::days(days))
}

/// Decode and signature-check a token.
///
/// Fails on a bad signature, an algorithm mismatch or an elapsed expiry, with
/// no leeway. There is no revocation list, a valid unexpired signature is
/// always accepted.
pub fn verify(token: &str, secret: &SecretString) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .context("invalid token")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-secret".to_string())
    }

    #[test]
    fn access_token_round_trip() {
        let token = issue_access("a@x.com", &secret(), 30).unwrap();
        let claims = verify(&token, &secret()).unwrap();
        assert_eq!(claims.email, "a@x.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let access = issue_access("a@x.com", &secret(), 30).unwrap();
        let refresh = issue_refresh("a@x.com", &secret(), 7).unwrap();
        let access_exp = verify(&access, &secret()).unwrap().exp;
        let refresh_exp = verify(&refresh, &secret()).unwrap().exp;
        assert!(refresh_exp > access_exp);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_access("a@x.com", &secret(), -1).unwrap();
        assert!(verify(&token, &secret()).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_access("a@x.com", &secret(), 30).unwrap();
        let other = SecretString::from("other-secret".to_string());
        assert!(verify(&token, &other).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify("not-a-jwt", &secret()).is_err());
    }
}
