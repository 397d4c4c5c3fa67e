//! Connection configuration.
//!
//! Environment variables (a `.env` file in the working directory is loaded first):
//!   DATABASE_URL                    # required, e.g. postgres://... or sqlite://member.db?mode=rwc
//!   DATABASE_MAX_CONNECTIONS        # default 10
//!   DATABASE_ACQUIRE_TIMEOUT_MS     # default 5000
//!   DATABASE_STATEMENT_TIMEOUT_MS   # default 10000

use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long `acquire` waits for a free connection before reporting `PoolExhausted`.
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    /// Load from the process environment after reading `.env`, if present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded .env from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(url);
        if let Some(raw) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse_number("DATABASE_MAX_CONNECTIONS", &raw)?;
            if config.max_connections == 0 {
                return Err(Error::Config(
                    "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
                ));
            }
        }
        if let Some(raw) = lookup("DATABASE_ACQUIRE_TIMEOUT_MS") {
            config.acquire_timeout =
                Duration::from_millis(parse_number("DATABASE_ACQUIRE_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("DATABASE_STATEMENT_TIMEOUT_MS") {
            config.statement_timeout =
                Duration::from_millis(parse_number("DATABASE_STATEMENT_TIMEOUT_MS", &raw)?);
        }
        Ok(config)
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Build the connection pool described by this configuration.
    pub async fn connect(&self) -> Result<AnyPool> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await
            .map_err(|err| Error::data_access("connect", err))?;
        tracing::info!(
            max_connections = self.max_connections,
            acquire_timeout = ?self.acquire_timeout,
            "connection pool ready"
        );
        Ok(pool)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}
