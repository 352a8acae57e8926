use secrecy::SecretString;

/// Runtime configuration shared with every handler via an Extension layer.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub mail_url: Option<String>,
    pub mail_strict: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            access_token_minutes: 30,
            refresh_token_days: 7,
            mail_url: None,
            mail_strict: false,
        }
    }
}
