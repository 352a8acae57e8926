use crate::catraca::new;
use crate::cli::actions::Action;
use anyhow::{anyhow, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, globals } => {
            let parsed = Url::parse(&dsn)?;

            if !matches!(parsed.scheme(), "postgres" | "postgresql") {
                return Err(anyhow!("unsupported DSN scheme: {}", parsed.scheme()));
            }

            new(port, dsn, globals).await?;
        }
    }

    Ok(())
}
