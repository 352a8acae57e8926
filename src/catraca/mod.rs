use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, patch, post},
    Extension, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod activation;
pub mod authz;
pub mod email;
pub mod handlers;
pub mod messages;
pub mod password;
pub mod store;
pub mod token;

use email::{HttpMailer, LogMailer, Mailer};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::register::register,
        handlers::login::login,
        handlers::login::social_login,
        handlers::activate::activate_account,
        handlers::activate::resend_code,
        handlers::admin::admin_setup,
        handlers::admin::admin_setup_confirm,
        handlers::users::list_connections,
        handlers::users::read_user,
        handlers::users::read_user_by_email,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::update_role,
        handlers::users::update_role_super_admin,
    ),
    components(schemas(
        handlers::register::RegisterRequest,
        handlers::login::LoginRequest,
        handlers::login::SocialLoginRequest,
        handlers::login::TokenPair,
        handlers::login::SocialTokenPair,
        handlers::activate::ActivateRequest,
        handlers::activate::ResendRequest,
        handlers::admin::AdminSetupRequest,
        handlers::admin::AdminSetupConfirmRequest,
        handlers::users::UserUpdateRequest,
        handlers::users::RoleUpdateRequest,
        store::User,
        store::Role,
        store::Connection,
    )),
    tags(
        (name = "auth", description = "Registration, activation and login"),
        (name = "users", description = "User records and roles"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Assemble the router with its middleware stack and shared state.
pub fn app(pool: PgPool, globals: GlobalArgs, mailer: Arc<dyn Mailer>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/login/social", post(handlers::social_login))
        .route(
            "/api/auth/activate-account",
            patch(handlers::activate_account),
        )
        .route("/api/auth/resend-code", post(handlers::resend_code))
        .route(
            "/api/auth/admin-setup",
            post(handlers::admin_setup).patch(handlers::admin_setup_confirm),
        )
        .route("/api/auth/connections", get(handlers::users::list_connections))
        .route(
            "/api/users/:user_id",
            get(handlers::users::read_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/api/users/email/:user_email",
            get(handlers::users::read_user_by_email),
        )
        .route("/api/users/role/:user_id", patch(handlers::users::update_role))
        .route(
            "/api/users/role/super-admin/:user_id",
            patch(handlers::users::update_role_super_admin),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(globals))
                .layer(Extension(mailer))
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(pool))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: GlobalArgs) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    store::migrate(&pool).await?;

    let mailer: Arc<dyn Mailer> = match &globals.mail_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone())?),
        None => Arc::new(LogMailer),
    };

    let app = app(pool, globals, mailer);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap();
        let globals = GlobalArgs::new(SecretString::from("test-secret".to_string()));
        app(pool, globals, Arc::new(LogMailer))
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/health",
            "/api/auth/register",
            "/api/auth/login",
            "/api/auth/login/social",
            "/api/auth/activate-account",
            "/api/auth/resend-code",
            "/api/auth/admin-setup",
            "/api/auth/connections",
            "/api/users/{user_id}",
            "/api/users/email/{user_email}",
            "/api/users/role/{user_id}",
            "/api/users/role/super-admin/{user_id}",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn health_route_responds() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-App"));
    }

    #[tokio::test]
    async fn protected_route_rejects_anonymous() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/users/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn connections_route_is_public() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/auth/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
