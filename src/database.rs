//! Document store connection handling
//!
//! The connection is established once at startup and the resulting
//! [`Database`] handle is passed on to the stores; nothing here is global.

use crate::config::MongoConfig;
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use std::{future::Future, time::Duration};

/// Build a client for `config` without contacting the server.
pub async fn open(config: &MongoConfig) -> Result<Database> {
    let mut options = ClientOptions::parse(&config.uri)
        .await
        .context("failed to parse MongoDB connection string")?;
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    options.server_selection_timeout = Some(config.server_selection_timeout);
    options.connect_timeout = Some(config.connect_timeout);

    let client = Client::with_options(options).context("failed to create MongoDB client")?;
    Ok(client.database(&config.database))
}

/// Build a client for `config` and verify the server answers a `ping`.
pub async fn connect(config: &MongoConfig) -> Result<Database> {
    let database = open(config).await?;
    ping(&database).await?;

    info!("connected to MongoDB database {}", config.database);
    Ok(database)
}

/// Connect with the bounded, fixed-delay retry policy of `config`.
pub async fn connect_with_retry(config: &MongoConfig) -> Result<Database> {
    retry(config.connect_retries, config.retry_delay, || connect(config))
        .await
        .context("failed to connect to MongoDB after retries")
}

pub async fn ping(database: &Database) -> Result<()> {
    database
        .run_command(doc! { "ping": 1 })
        .await
        .context("failed to ping MongoDB")?;
    Ok(())
}

/// Run `operation` up to `attempts` times, sleeping `delay` between failed
/// attempts. Returns the last error when every attempt failed.
pub async fn retry<T, F, Fut>(attempts: u32, delay: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = anyhow!("no connection attempt made");

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("connection attempt {attempt} failed: {e:#}");
                last_error = e;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::cell::Cell;

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = Cell::new(0);

        let result = retry(5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    bail!("attempt {attempt} refused");
                }
                Ok::<_, anyhow::Error>(attempt)
            }
        })
        .await;

        assert_eq!(result.expect("should succeed"), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_all_attempts() {
        let calls = Cell::new(0);

        let result: Result<()> = retry(5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move { Err::<(), _>(anyhow!("attempt {attempt} refused")) }
        })
        .await;

        assert_eq!(calls.get(), 5);
        assert_eq!(result.unwrap_err().to_string(), "attempt 5 refused");
    }

    #[tokio::test]
    async fn connect_rejects_malformed_uri() {
        let config = MongoConfig {
            uri: "not-a-mongodb-uri".to_string(),
            database: "test".to_string(),
            collection: "test".to_string(),
            connect_retries: 1,
            retry_delay: Duration::ZERO,
            server_selection_timeout: Duration::from_millis(10),
            connect_timeout: Duration::from_millis(10),
        };

        let result = connect(&config).await;

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("failed to parse MongoDB connection string")
        );
    }
}
