//! User records and every query the service runs against Postgres.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use utoipa::ToSchema;

/// Authorization role. `Admin` and `Coadmin` are reserved for institutional
/// accounts, see [`crate::catraca::authz`].
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
    Coadmin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::Coadmin => "COADMIN",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            "COADMIN" => Some(Self::Coadmin),
            _ => None,
        }
    }
}

/// Institutional category of an account, fixed set.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connection {
    Aluno,
    Estudante,
    Professor,
    Servidor,
    Comunidade,
    Admin,
}

impl Connection {
    pub const ALL: [Self; 6] = [
        Self::Aluno,
        Self::Estudante,
        Self::Professor,
        Self::Servidor,
        Self::Comunidade,
        Self::Admin,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aluno => "ALUNO",
            Self::Estudante => "ESTUDANTE",
            Self::Professor => "PROFESSOR",
            Self::Servidor => "SERVIDOR",
            Self::Comunidade => "COMUNIDADE",
            Self::Admin => "ADMIN",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == value)
    }
}

#[derive(ToSchema, Serialize, Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub connection: Option<Connection>,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub activation_code: Option<i32>,
    #[serde(skip)]
    pub activation_attempts: i32,
}

/// Fields a partial update may touch. `None` leaves the column as is.
#[derive(Debug, Default, Clone)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub connection: Option<Connection>,
}

/// Outcome of an insert that may race another registration on the same email.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(User),
    Conflict,
}

const RETURNING: &str =
    "id, name, email, connection, password_hash, role, is_active, activation_code, activation_attempts";

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    let connection: Option<String> = row.get("connection");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        connection: match connection {
            Some(value) => Some(
                Connection::parse(&value)
                    .ok_or_else(|| anyhow!("unknown connection in store: {value}"))?,
            ),
            None => None,
        },
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown role in store: {role}"))?,
        is_active: row.get("is_active"),
        password_hash: row.get("password_hash"),
        activation_code: row.get("activation_code"),
        activation_attempts: row.get("activation_attempts"),
    })
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Bootstrap the schema. The UNIQUE constraint on email is the backstop for
/// concurrent registrations racing the pre-check.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let query = r"
        CREATE TABLE IF NOT EXISTS users (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            connection TEXT,
            password_hash TEXT,
            role TEXT NOT NULL DEFAULT 'USER',
            is_active BOOLEAN NOT NULL DEFAULT FALSE,
            activation_code INTEGER,
            activation_attempts INTEGER NOT NULL DEFAULT 0
        )
    ";
    sqlx::query(query)
        .execute(pool)
        .instrument(query_span("CREATE", query))
        .await
        .context("failed to create users table")?;

    Ok(())
}

pub async fn create_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    connection: Option<Connection>,
    password_hash: Option<&str>,
    is_active: bool,
    activation_code: Option<i32>,
) -> Result<CreateOutcome> {
    let query = format!(
        r"
        INSERT INTO users (name, email, connection, password_hash, is_active, activation_code)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {RETURNING}
    "
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(email)
        .bind(connection.map(Connection::as_str))
        .bind(password_hash)
        .bind(is_active)
        .bind(activation_code)
        .fetch_one(pool)
        .instrument(query_span("INSERT", &query))
        .await;

    match row {
        Ok(row) => Ok(CreateOutcome::Created(user_from_row(&row)?)),
        Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub async fn get_user(pool: &PgPool, id: i32) -> Result<Option<User>> {
    let query = format!("SELECT {RETURNING} FROM users WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", &query))
        .await
        .context("failed to get user by id")?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let query = format!("SELECT {RETURNING} FROM users WHERE email = $1");
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", &query))
        .await
        .context("failed to get user by email")?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn update_user(pool: &PgPool, id: i32, patch: &UserPatch) -> Result<Option<User>> {
    let query = format!(
        r"
        UPDATE users SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            connection = COALESCE($4, connection)
        WHERE id = $1
        RETURNING {RETURNING}
    "
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.connection.map(Connection::as_str))
        .fetch_optional(pool)
        .instrument(query_span("UPDATE", &query))
        .await
        .context("failed to update user")?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn update_role(pool: &PgPool, id: i32, role: Role) -> Result<Option<User>> {
    let query = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {RETURNING}");
    let row = sqlx::query(&query)
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(pool)
        .instrument(query_span("UPDATE", &query))
        .await
        .context("failed to update role")?;

    row.as_ref().map(user_from_row).transpose()
}

/// Attach a fresh one-time code and reset the attempt counter.
pub async fn set_activation_code(pool: &PgPool, id: i32, code: i32) -> Result<()> {
    let query = "UPDATE users SET activation_code = $2, activation_attempts = 0 WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .bind(code)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to set activation code")?;

    Ok(())
}

/// Count a wrong guess; returns the updated attempt count.
pub async fn record_failed_attempt(pool: &PgPool, id: i32) -> Result<i32> {
    let query = r"
        UPDATE users SET activation_attempts = activation_attempts + 1
        WHERE id = $1
        RETURNING activation_attempts
    ";
    let row = sqlx::query(query)
        .bind(id)
        .fetch_one(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to record activation attempt")?;

    Ok(row.get("activation_attempts"))
}

/// Invalidate the outstanding code, forcing a resend.
pub async fn clear_activation_code(pool: &PgPool, id: i32) -> Result<()> {
    let query = "UPDATE users SET activation_code = NULL, activation_attempts = 0 WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to clear activation code")?;

    Ok(())
}

/// Flip the account to active and consume the code.
pub async fn activate_user(pool: &PgPool, id: i32) -> Result<()> {
    let query = r"
        UPDATE users SET is_active = TRUE, activation_code = NULL, activation_attempts = 0
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to activate user")?;

    Ok(())
}

pub async fn set_password(pool: &PgPool, id: i32, password_hash: &str) -> Result<()> {
    let query = r"
        UPDATE users SET password_hash = $2, activation_code = NULL, activation_attempts = 0
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to set password")?;

    Ok(())
}

/// Hard delete, no tombstone.
pub async fn delete_user(pool: &PgPool, id: i32) -> Result<()> {
    let query = "DELETE FROM users WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to delete user")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn role_round_trips() {
        for role in [Role::User, Role::Admin, Role::Coadmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("SUPERADMIN"), None);
    }

    #[test]
    fn role_serializes_uppercase() {
        let value = serde_json::to_value(Role::Coadmin).unwrap();
        assert_eq!(value, serde_json::json!("COADMIN"));
    }

    #[test]
    fn connection_round_trips() {
        for connection in Connection::ALL {
            assert_eq!(Connection::parse(connection.as_str()), Some(connection));
        }
        assert_eq!(Connection::parse("INVALID"), None);
        assert_eq!(Connection::parse("aluno"), None);
    }

    #[test]
    fn user_json_hides_credentials() {
        let user = User {
            id: 1,
            name: "Forsen".to_string(),
            email: "valid@email.com".to_string(),
            connection: Some(Connection::Professor),
            role: Role::User,
            is_active: false,
            password_hash: Some("$2b$12$hash".to_string()),
            activation_code: Some(123_456),
            activation_attempts: 0,
        };

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["email"], "valid@email.com");
        assert_eq!(value["connection"], "PROFESSOR");
        assert!(value.get("password_hash").is_none());
        assert!(value.get("activation_code").is_none());
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
