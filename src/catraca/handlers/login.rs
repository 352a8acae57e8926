use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::detail;
use crate::catraca::{
    messages, password,
    store::{self, CreateOutcome},
    token,
};
use crate::cli::globals::GlobalArgs;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SocialLoginRequest {
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SocialTokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub is_new_user: bool,
}

fn issue_pair(email: &str, globals: &GlobalArgs) -> anyhow::Result<(String, String)> {
    let access = token::issue_access(email, &globals.token_secret, globals.access_token_minutes)?;
    let refresh = token::issue_refresh(email, &globals.token_secret, globals.refresh_token_days)?;
    Ok((access, refresh))
}

/// Password login for activated accounts.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair, content_type = "application/json"),
        (status = 401, description = "Account is not active"),
        (status = 404, description = "Unknown user or password mismatch"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let user = match store::get_user_by_email(&pool, &request.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND).into_response();
        }
        Err(err) => {
            error!("Failed to look up user: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed").into_response();
        }
    };

    // Social-only accounts have no hash and can never password-login
    let matches = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| password::verify(&request.password, hash));

    if !matches {
        return detail(StatusCode::NOT_FOUND, messages::PASSWORD_NO_MATCH).into_response();
    }

    if !user.is_active {
        return detail(StatusCode::UNAUTHORIZED, messages::ACCOUNT_IS_NOT_ACTIVE).into_response();
    }

    match issue_pair(&user.email, &globals) {
        Ok((access_token, refresh_token)) => Json(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        })
        .into_response(),
        Err(err) => {
            error!("Failed to issue tokens: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed").into_response()
        }
    }
}

/// Social-login shortcut: the identity provider already proved control of the
/// email, so an unknown address becomes an active account on the spot.
#[utoipa::path(
    post,
    path = "/api/auth/login/social",
    request_body = SocialLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SocialTokenPair, content_type = "application/json"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn social_login(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<SocialLoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let existing = match store::get_user_by_email(&pool, &request.email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to look up user: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed").into_response();
        }
    };

    let (user, is_new_user) = match existing {
        Some(user) => (user, false),
        None => {
            match store::create_user(&pool, &request.name, &request.email, None, None, true, None)
                .await
            {
                Ok(CreateOutcome::Created(user)) => (user, true),
                // Lost a race with a concurrent signup for the same email
                Ok(CreateOutcome::Conflict) => {
                    match store::get_user_by_email(&pool, &request.email).await {
                        Ok(Some(user)) => (user, false),
                        Ok(None) | Err(_) => {
                            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
                                .into_response();
                        }
                    }
                }
                Err(err) => {
                    error!("Failed to create social user: {err}");
                    return detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
                        .into_response();
                }
            }
        }
    };

    match issue_pair(&user.email, &globals) {
        Ok((access_token, refresh_token)) => Json(SocialTokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            is_new_user,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to issue tokens: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Login failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn globals() -> GlobalArgs {
        GlobalArgs::new(SecretString::from("test-secret".to_string()))
    }

    fn pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap()
    }

    #[tokio::test]
    async fn login_missing_payload() {
        let response = login(Extension(pool()), Extension(globals()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn social_login_missing_payload() {
        let response = social_login(Extension(pool()), Extension(globals()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn issue_pair_tokens_verify_back_to_subject() {
        let globals = globals();
        let (access, refresh) = issue_pair("a@x.com", &globals).unwrap();
        let access_claims = token::verify(&access, &globals.token_secret).unwrap();
        let refresh_claims = token::verify(&refresh, &globals.token_secret).unwrap();
        assert_eq!(access_claims.email, "a@x.com");
        assert!(refresh_claims.exp > access_claims.exp);
    }
}
