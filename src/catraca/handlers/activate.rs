use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{detail, success};
use crate::catraca::{activation, authz, email::Mailer, messages, store};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateRequest {
    pub email: String,
    pub code: i32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendRequest {
    pub email: String,
}

/// Consume the one-time code and flip the account to active.
///
/// Wrong guesses are counted; after too many the stored code is invalidated
/// and the user has to request a new one.
#[utoipa::path(
    patch,
    path = "/api/auth/activate-account",
    request_body = ActivateRequest,
    responses(
        (status = 200, description = "Account activated"),
        (status = 400, description = "Account already active"),
        (status = 404, description = "Unknown user or wrong code"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn activate_account(
    pool: Extension<PgPool>,
    payload: Option<Json<ActivateRequest>>,
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
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Activation failed")
                .into_response();
        }
    };

    if user.is_active {
        return detail(StatusCode::BAD_REQUEST, messages::ACCOUNT_ALREADY_ACTIVE).into_response();
    }

    if !activation::code_matches(request.code, user.activation_code) {
        match store::record_failed_attempt(&pool, user.id).await {
            Ok(attempts) if activation::attempts_exhausted(attempts) => {
                if let Err(err) = store::clear_activation_code(&pool, user.id).await {
                    error!("Failed to invalidate activation code: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => error!("Failed to record activation attempt: {err}"),
        }

        return detail(StatusCode::NOT_FOUND, messages::INVALID_CODE).into_response();
    }

    if let Err(err) = store::activate_user(&pool, user.id).await {
        error!("Failed to activate user: {err}");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Activation failed").into_response();
    }

    success(StatusCode::OK).into_response()
}

/// Attach a fresh code to a pending account and dispatch it again. The old
/// code stops matching as soon as the new one is stored.
#[utoipa::path(
    post,
    path = "/api/auth/resend-code",
    request_body = ResendRequest,
    responses(
        (status = 201, description = "New code dispatched"),
        (status = 400, description = "Account already active"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_code(
    pool: Extension<PgPool>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<ResendRequest>>,
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
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Resend failed").into_response();
        }
    };

    if user.is_active {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": messages::ACCOUNT_ALREADY_ACTIVE,
            })),
        )
            .into_response();
    }

    let code = activation::generate_code();
    if let Err(err) = store::set_activation_code(&pool, user.id, code).await {
        error!("Failed to store activation code: {err}");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Resend failed").into_response();
    }

    if let Err(err) = mailer
        .send_activation_code(&user.email, code, authz::is_institutional(&user.email))
        .await
    {
        // Best-effort, the stored code stays valid for the next resend
        error!("Failed to dispatch activation email: {err}");
    }

    success(StatusCode::CREATED).into_response()
}
