//! Password self-service for institutional accounts.

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
    store::{self, User},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AdminSetupRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AdminSetupConfirmRequest {
    pub email: String,
    pub code: i32,
    pub password: String,
}

/// Shared guards: the account must exist, be active and institutional.
async fn eligible_account(
    pool: &PgPool,
    email: &str,
) -> Result<User, (StatusCode, Json<serde_json::Value>)> {
    let user = match store::get_user_by_email(pool, email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND)),
        Err(err) => {
            error!("Failed to look up user: {err}");
            return Err(detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Admin setup failed",
            ));
        }
    };

    if !user.is_active {
        return Err(detail(
            StatusCode::BAD_REQUEST,
            messages::ACCOUNT_NOT_ACTIVE_DETAIL,
        ));
    }

    if !authz::is_institutional(&user.email) {
        return Err(detail(
            StatusCode::BAD_REQUEST,
            messages::ACCOUNT_NOT_INSTITUTIONAL,
        ));
    }

    Ok(user)
}

/// Start a password set/reset: store a one-time code and mail it.
#[utoipa::path(
    post,
    path = "/api/auth/admin-setup",
    request_body = AdminSetupRequest,
    responses(
        (status = 201, description = "Reset code dispatched"),
        (status = 400, description = "Account is not active or not institutional"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn admin_setup(
    pool: Extension<PgPool>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<AdminSetupRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let user = match eligible_account(&pool, &request.email).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    let code = activation::generate_code();
    if let Err(err) = store::set_activation_code(&pool, user.id, code).await {
        error!("Failed to store reset code: {err}");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Admin setup failed").into_response();
    }

    if let Err(err) = mailer.send_reset_code(&user.email, code).await {
        error!("Failed to dispatch reset email: {err}");
    }

    success(StatusCode::CREATED).into_response()
}

/// Finish the reset: the emailed code proves control of the inbox, then the
/// new password has to pass the same policy as registration.
#[utoipa::path(
    patch,
    path = "/api/auth/admin-setup",
    request_body = AdminSetupConfirmRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Account ineligible or invalid password"),
        (status = 404, description = "Unknown user or wrong code"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn admin_setup_confirm(
    pool: Extension<PgPool>,
    payload: Option<Json<AdminSetupConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let user = match eligible_account(&pool, &request.email).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    if !activation::code_matches(request.code, user.activation_code) {
        match store::record_failed_attempt(&pool, user.id).await {
            Ok(attempts) if activation::attempts_exhausted(attempts) => {
                if let Err(err) = store::clear_activation_code(&pool, user.id).await {
                    error!("Failed to invalidate reset code: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => error!("Failed to record reset attempt: {err}"),
        }

        return detail(StatusCode::NOT_FOUND, messages::INVALID_CODE).into_response();
    }

    if !password::validate(&request.password) {
        return detail(StatusCode::BAD_REQUEST, messages::INVALID_PASSWORD).into_response();
    }

    let password_hash = match password::hash(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Admin setup failed")
                .into_response();
        }
    };

    if let Err(err) = store::set_password(&pool, user.id, &password_hash).await {
        error!("Failed to set password: {err}");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Admin setup failed").into_response();
    }

    success(StatusCode::OK).into_response()
}
