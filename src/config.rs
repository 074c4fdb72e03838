//! Runtime configuration.
//!
//! | Variable                   | Default                     | Description                          |
//! |----------------------------|-----------------------------|--------------------------------------|
//! | `AOTMS_API_URL`            | `http://localhost:5000/api` | Backend REST base URL                |
//! | `AOTMS_STORE`              | `file:.aotms/storage.json`  | `file:<path>` or `postgres`          |
//! | `AOTMS_POLL_INTERVAL_SECS` | `30`                        | Notification poll interval          |
//! | `AOTMS_HTTP_TIMEOUT_SECS`  | `10`                        | Per-request timeout                  |
//! | `DATABASE_URL`             | --                          | Required only for the Postgres store |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::db;
use crate::storage::{FileStore, KeyValueStore};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_STORE_PATH: &str = ".aotms/storage.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Postgres,
}

impl FromStr for StoreLocation {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("postgres") {
            return Ok(StoreLocation::Postgres);
        }

        let path = value.strip_prefix("file:").unwrap_or(value);
        if path.is_empty() {
            anyhow::bail!("store location must be `postgres` or `file:<path>`");
        }
        Ok(StoreLocation::File(PathBuf::from(path)))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub store: StoreLocation,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            store: StoreLocation::File(PathBuf::from(DEFAULT_STORE_PATH)),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            database_url: None,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let api_url = lookup("AOTMS_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let store = match lookup("AOTMS_STORE") {
            Some(raw) => raw.parse().context("invalid AOTMS_STORE")?,
            None => defaults.store,
        };

        let poll_interval = lookup("AOTMS_POLL_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let http_timeout = lookup("AOTMS_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Ok(Self {
            api_url,
            store,
            poll_interval,
            http_timeout,
            database_url: lookup("DATABASE_URL"),
        })
    }

    pub async fn open_store(&self) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        match &self.store {
            StoreLocation::File(path) => {
                let store = FileStore::open(path)
                    .await
                    .with_context(|| format!("failed to open store at {}", path.display()))?;
                Ok(Arc::new(store))
            }
            StoreLocation::Postgres => {
                let pool = self.connect_db().await?;
                Ok(Arc::new(db::PgStore::new(pool)))
            }
        }
    }

    pub async fn connect_db(&self) -> anyhow::Result<sqlx::PgPool> {
        let database_url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to use the Postgres store")?;
        db::connect(database_url)
            .await
            .context("failed to connect to Postgres")
    }
}
