pub mod health;
pub use self::health::{health, root};

pub mod register;
pub use self::register::register;

pub mod login;
pub use self::login::{login, social_login};

pub mod activate;
pub use self::activate::{activate_account, resend_code};

pub mod admin;
pub use self::admin::{admin_setup, admin_setup_confirm};

pub mod users;

// common functions for the handlers
use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::catraca::{
    messages,
    token::{self, Claims},
};
use crate::cli::globals::GlobalArgs;

/// Error body with the stable `detail` message constant.
pub(crate) fn detail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": message })))
}

pub(crate) fn success(status: StatusCode) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "status": "success" })))
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Decode the bearer token from the request headers.
///
/// Only the identity claims come from the token; the caller's role is always
/// re-read from the store by whoever needs it.
pub(crate) fn authenticate(
    headers: &HeaderMap,
    globals: &GlobalArgs,
) -> Result<Claims, (StatusCode, Json<Value>)> {
    let Some(bearer) = bearer_token(headers) else {
        return Err(detail(StatusCode::UNAUTHORIZED, messages::INVALID_TOKEN));
    };

    token::verify(bearer, &globals.token_secret)
        .map_err(|_| detail(StatusCode::UNAUTHORIZED, messages::INVALID_TOKEN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use secrecy::SecretString;

    fn globals() -> GlobalArgs {
        GlobalArgs::new(SecretString::from("test-secret".to_string()))
    }

    #[test]
    fn bearer_token_strips_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn authenticate_missing_header() {
        let result = authenticate(&HeaderMap::new(), &globals());
        assert_eq!(result.unwrap_err().0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn authenticate_round_trip() {
        let globals = globals();
        let access = token::issue_access("a@x.com", &globals.token_secret, 30).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {access}")).unwrap(),
        );
        let claims = authenticate(&headers, &globals).unwrap();
        assert_eq!(claims.email, "a@x.com");
    }

    #[test]
    fn authenticate_garbage_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer junk"));
        let result = authenticate(&headers, &globals());
        assert_eq!(result.unwrap_err().0, StatusCode::UNAUTHORIZED);
    }
}
