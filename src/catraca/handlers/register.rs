use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{detail, success};
use crate::catraca::{
    activation, authz,
    email::Mailer,
    messages, password,
    store::{self, Connection, CreateOutcome},
};
use crate::cli::globals::GlobalArgs;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub connection: String,
    pub password: String,
}

/// Create a pending account and dispatch its activation code.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful, activation code dispatched"),
        (status = 400, description = "Invalid connection, invalid password or email already registered"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let Some(connection) = Connection::parse(&request.connection) else {
        return detail(StatusCode::BAD_REQUEST, messages::INVALID_CONNECTION).into_response();
    };

    if !password::validate(&request.password) {
        return detail(StatusCode::BAD_REQUEST, messages::INVALID_PASSWORD).into_response();
    }

    // Friendly pre-check; the UNIQUE constraint below still backstops races
    match store::get_user_by_email(&pool, &request.email).await {
        Ok(None) => {}
        Ok(Some(_)) => {
            return detail(StatusCode::BAD_REQUEST, messages::EMAIL_ALREADY_REGISTERED)
                .into_response();
        }
        Err(err) => {
            error!("Failed to check email uniqueness: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
                .into_response();
        }
    }

    let password_hash = match password::hash(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
                .into_response();
        }
    };

    let code = activation::generate_code();

    let user = match store::create_user(
        &pool,
        &request.name,
        &request.email,
        Some(connection),
        Some(&password_hash),
        false,
        Some(code),
    )
    .await
    {
        Ok(CreateOutcome::Created(user)) => user,
        Ok(CreateOutcome::Conflict) => {
            return detail(StatusCode::BAD_REQUEST, messages::EMAIL_ALREADY_REGISTERED)
                .into_response();
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
                .into_response();
        }
    };

    let is_institutional = authz::is_institutional(&user.email);
    if let Err(err) = mailer
        .send_activation_code(&user.email, code, is_institutional)
        .await
    {
        if globals.mail_strict {
            error!("Failed to dispatch activation email, rolling back: {err}");
            if let Err(err) = store::delete_user(&pool, user.id).await {
                error!("Failed to roll back pending user {}: {err}", user.id);
            }
            return detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to dispatch activation email",
            )
            .into_response();
        }

        // Best-effort by default: the pending account stays, resend recovers
        error!("Failed to dispatch activation email: {err}");
    }

    success(StatusCode::CREATED).into_response()
}
