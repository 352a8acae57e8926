//! User record CRUD and role management, all behind a bearer token.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{authenticate, detail};
use crate::catraca::{
    authz::{self, RoleCheck},
    messages,
    store::{self, Connection, Role, User, UserPatch},
};
use crate::cli::globals::GlobalArgs;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub connection: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RoleUpdateRequest {
    pub role: String,
}

/// The fixed set of institutional categories, for signup forms.
#[utoipa::path(
    get,
    path = "/api/auth/connections",
    responses(
        (status = 200, description = "Available connections", content_type = "application/json"),
    ),
    tag = "auth"
)]
#[allow(clippy::unused_async)]
pub async fn list_connections() -> impl IntoResponse {
    let connections: Vec<&str> = Connection::ALL.iter().map(|item| item.as_str()).collect();
    Json(connections)
}

async fn fetch_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<User, (StatusCode, Json<serde_json::Value>)> {
    match store::get_user(pool, user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND)),
        Err(err) => {
            error!("Failed to look up user: {err}");
            Err(detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "User lookup failed",
            ))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User record", body = User, content_type = "application/json"),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn read_user(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    if let Err(response) = authenticate(&headers, &globals) {
        return response.into_response();
    }

    match fetch_user(&pool, user_id).await {
        Ok(user) => Json(user).into_response(),
        Err(response) => response.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/users/email/{user_email}",
    params(("user_email" = String, Path, description = "User email")),
    responses(
        (status = 200, description = "User record", body = User, content_type = "application/json"),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn read_user_by_email(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_email): Path<String>,
) -> impl IntoResponse {
    if let Err(response) = authenticate(&headers, &globals) {
        return response.into_response();
    }

    match store::get_user_by_email(&pool, &user_email).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND).into_response(),
        Err(err) => {
            error!("Failed to look up user: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "User lookup failed").into_response()
        }
    }
}

/// Partial update of name, email and connection. Changing the email re-runs
/// the uniqueness check registration does.
#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    params(("user_id" = i32, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = User, content_type = "application/json"),
        (status = 400, description = "Invalid connection or email already registered"),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_user(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_id): Path<i32>,
    payload: Option<Json<UserUpdateRequest>>,
) -> impl IntoResponse {
    if let Err(response) = authenticate(&headers, &globals) {
        return response.into_response();
    }

    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let connection = match request.connection.as_deref() {
        Some(value) => match Connection::parse(value) {
            Some(connection) => Some(connection),
            None => {
                return detail(StatusCode::BAD_REQUEST, messages::INVALID_CONNECTION)
                    .into_response();
            }
        },
        None => None,
    };

    let user = match fetch_user(&pool, user_id).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    if let Some(new_email) = request.email.as_deref() {
        if new_email != user.email {
            match store::get_user_by_email(&pool, new_email).await {
                Ok(None) => {}
                Ok(Some(_)) => {
                    return detail(StatusCode::BAD_REQUEST, messages::EMAIL_ALREADY_REGISTERED)
                        .into_response();
                }
                Err(err) => {
                    error!("Failed to check email uniqueness: {err}");
                    return detail(StatusCode::INTERNAL_SERVER_ERROR, "User update failed")
                        .into_response();
                }
            }
        }
    }

    let patch = UserPatch {
        name: request.name,
        email: request.email,
        connection,
    };

    match store::update_user(&pool, user_id, &patch).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND).into_response(),
        Err(err) => {
            error!("Failed to update user: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "User update failed").into_response()
        }
    }
}

/// Hard delete; returns the removed record.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted user", body = User, content_type = "application/json"),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    if let Err(response) = authenticate(&headers, &globals) {
        return response.into_response();
    }

    let user = match fetch_user(&pool, user_id).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    if let Err(err) = store::delete_user(&pool, user.id).await {
        error!("Failed to delete user: {err}");
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "User delete failed").into_response();
    }

    Json(user).into_response()
}

/// Admin-only toggle between USER and ADMIN for the target account.
#[utoipa::path(
    patch,
    path = "/api/users/role/{user_id}",
    params(("user_id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Updated user", body = User, content_type = "application/json"),
        (status = 401, description = "Invalid token or no permission"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_role(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    let claims = match authenticate(&headers, &globals) {
        Ok(claims) => claims,
        Err(response) => return response.into_response(),
    };

    match authz::require_role(&pool, &claims.email, &[Role::Admin]).await {
        Ok(RoleCheck::Granted(_)) => {}
        Ok(RoleCheck::Denied) => {
            return detail(StatusCode::UNAUTHORIZED, messages::NO_PERMISSION).into_response();
        }
        Err(err) => {
            error!("Failed to check caller role: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Role update failed")
                .into_response();
        }
    }

    let user = match fetch_user(&pool, user_id).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    match store::update_role(&pool, user.id, authz::toggled(user.role)).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND).into_response(),
        Err(err) => {
            error!("Failed to update role: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Role update failed").into_response()
        }
    }
}

/// Admin-only assignment of an explicit role. ADMIN and COADMIN are reserved
/// for institutional emails.
#[utoipa::path(
    patch,
    path = "/api/users/role/super-admin/{user_id}",
    params(("user_id" = i32, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = User, content_type = "application/json"),
        (status = 400, description = "Invalid role or non-institutional target"),
        (status = 401, description = "Invalid token or no permission"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_role_super_admin(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    Path(user_id): Path<i32>,
    payload: Option<Json<RoleUpdateRequest>>,
) -> impl IntoResponse {
    let claims = match authenticate(&headers, &globals) {
        Ok(claims) => claims,
        Err(response) => return response.into_response(),
    };

    match authz::require_role(&pool, &claims.email, &[Role::Admin]).await {
        Ok(RoleCheck::Granted(_)) => {}
        Ok(RoleCheck::Denied) => {
            return detail(StatusCode::UNAUTHORIZED, messages::NO_PERMISSION).into_response();
        }
        Err(err) => {
            error!("Failed to check caller role: {err}");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Role update failed")
                .into_response();
        }
    }

    let Some(Json(request)) = payload else {
        return detail(StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let Some(new_role) = Role::parse(&request.role) else {
        return detail(StatusCode::BAD_REQUEST, messages::INVALID_ROLE).into_response();
    };

    let user = match fetch_user(&pool, user_id).await {
        Ok(user) => user,
        Err(response) => return response.into_response(),
    };

    if !authz::promotion_allowed(new_role, &user.email) {
        return detail(
            StatusCode::BAD_REQUEST,
            messages::PRIVILEGED_ROLE_NEEDS_INSTITUTIONAL_EMAIL,
        )
        .into_response();
    }

    match store::update_role(&pool, user.id, new_role).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, messages::USER_NOT_FOUND).into_response(),
        Err(err) => {
            error!("Failed to update role: {err}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Role update failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
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
    async fn connections_lists_the_fixed_set() {
        let response = list_connections().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                "ALUNO",
                "ESTUDANTE",
                "PROFESSOR",
                "SERVIDOR",
                "COMUNIDADE",
                "ADMIN"
            ])
        );
    }

    #[tokio::test]
    async fn read_user_rejects_missing_token() {
        let response = read_user(
            Extension(pool()),
            Extension(globals()),
            HeaderMap::new(),
            Path(1),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn read_user_by_email_rejects_missing_token() {
        let response = read_user_by_email(
            Extension(pool()),
            Extension(globals()),
            HeaderMap::new(),
            Path("a@x.com".to_string()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_user_rejects_missing_token() {
        let response = update_user(
            Extension(pool()),
            Extension(globals()),
            HeaderMap::new(),
            Path(1),
            Some(Json(UserUpdateRequest::default())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn delete_user_rejects_missing_token() {
        let response = delete_user(
            Extension(pool()),
            Extension(globals()),
            HeaderMap::new(),
            Path(1),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_role_rejects_garbage_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Bearer junk"),
        );
        let response = update_role(Extension(pool()), Extension(globals()), headers, Path(1))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_role_super_admin_rejects_missing_token() {
        let response = update_role_super_admin(
            Extension(pool()),
            Extension(globals()),
            HeaderMap::new(),
            Path(1),
            Some(Json(RoleUpdateRequest {
                role: "ADMIN".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
