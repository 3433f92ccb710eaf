//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use tessera_postgres::PgStorageOptions;

use crate::error::AppError;

/// Runtime configuration of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (`HOST`).
    pub host: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// PostgreSQL connection string (`DATABASE_URL`). The in-memory engine
    /// is used when absent.
    pub database_url: Option<String>,
    /// Options of the PostgreSQL engine (`TESSERA_TABLE`,
    /// `TESSERA_PAGE_SIZE`, `TESSERA_DOCUMENT_TTL_SECONDS`).
    pub storage: PgStorageOptions,
    /// Seconds between sweeps of expired records
    /// (`TESSERA_PURGE_INTERVAL_SECONDS`). Only used with a time-to-live.
    pub purge_interval_seconds: u64,
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut storage = PgStorageOptions::default();
        if let Some(table) = lookup("TESSERA_TABLE") {
            storage = storage.with_table_name(table);
        }
        if let Some(page_size) = parse(&lookup, "TESSERA_PAGE_SIZE")? {
            storage = storage.with_page_size(page_size);
        }
        if let Some(ttl) = parse(&lookup, "TESSERA_DOCUMENT_TTL_SECONDS")? {
            storage = storage.with_document_time_to_live_seconds(Some(ttl));
        }
        storage
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let purge_interval_seconds =
            parse(&lookup, "TESSERA_PURGE_INTERVAL_SECONDS")?.unwrap_or(300);
        if purge_interval_seconds == 0 {
            return Err(AppError::Config(
                "TESSERA_PURGE_INTERVAL_SECONDS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse(&lookup, "PORT")?.unwrap_or(3000),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            storage,
            purge_interval_seconds,
        })
    }

    /// The address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))
        })
        .transpose()
}
