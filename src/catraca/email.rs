//! Outbound mail. Delivery is best-effort: callers decide whether a dispatch
//! failure aborts the surrounding flow.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::catraca::APP_USER_AGENT;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation_code(&self, email: &str, code: i32, is_institutional: bool)
        -> Result<()>;

    async fn send_reset_code(&self, email: &str, code: i32) -> Result<()>;
}

pub(crate) const ACTIVATION_SUBJECT: &str = "Confirm your account";
pub(crate) const RESET_SUBJECT: &str = "Confirm your password change";

pub(crate) fn activation_body(code: i32, is_institutional: bool) -> String {
    let mut html = format!(
        "<p>Welcome! To confirm your account, use the code <strong>{code}</strong></p>"
    );

    if is_institutional {
        html.push_str(
            "<p>As an institutional user you can set up an administrator \
             password once your account is active.</p>",
        );
    }

    html
}

pub(crate) fn reset_body(code: i32) -> String {
    format!(
        "<p>A password change was requested for your account. If you made this \
         request, use the code <strong>{code}</strong> to change your password.</p>\
         <p>If you did not, please ignore this email.</p>"
    )
}

/// Logs instead of delivering. Used when no mail relay is configured.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation_code(
        &self,
        email: &str,
        code: i32,
        is_institutional: bool,
    ) -> Result<()> {
        info!(
            to_email = %email,
            code,
            is_institutional,
            "activation mail send stub"
        );
        Ok(())
    }

    async fn send_reset_code(&self, email: &str, code: i32) -> Result<()> {
        info!(to_email = %email, code, "reset mail send stub");
        Ok(())
    }
}

/// Posts rendered messages to an HTTP mail relay.
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailer {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build mail client")?;

        Ok(Self { client, endpoint })
    }

    async fn post(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("failed to reach mail relay")?;

        response
            .error_for_status()
            .context("mail relay rejected the message")?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_activation_code(
        &self,
        email: &str,
        code: i32,
        is_institutional: bool,
    ) -> Result<()> {
        self.post(
            email,
            ACTIVATION_SUBJECT,
            &activation_body(code, is_institutional),
        )
        .await
    }

    async fn send_reset_code(&self, email: &str, code: i32) -> Result<()> {
        self.post(email, RESET_SUBJECT, &reset_body(code)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_body_contains_code() {
        let body = activation_body(123_456, false);
        assert!(body.contains("123456"));
        assert!(!body.contains("administrator"));
    }

    #[test]
    fn activation_body_mentions_admin_setup_for_institutional() {
        let body = activation_body(123_456, true);
        assert!(body.contains("123456"));
        assert!(body.contains("administrator"));
    }

    #[test]
    fn reset_body_contains_code() {
        assert!(reset_body(654_321).contains("654321"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer
            .send_activation_code("a@x.com", 123_456, false)
            .await
            .is_ok());
        assert!(mailer.send_reset_code("a@x.com", 123_456).await.is_ok());
    }
}
