//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tessera_core::in_memory::InMemoryStorageEngine;
use tessera_core::store::EventStore;
use tessera_postgres::PgStorageEngine;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The event store every route works against.
    pub store: EventStore,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// Opens the storage engine `config` selects: PostgreSQL when a
    /// database URL is configured, the in-memory engine otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the pool cannot connect and
    /// `AppError::Storage` if the record table cannot be created.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, AppError> {
        let Some(database_url) = &config.database_url else {
            warn!("DATABASE_URL not set; events are kept in memory only");
            return Ok(Self::new(EventStore::new(Arc::new(
                InMemoryStorageEngine::new(),
            ))));
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let engine = PgStorageEngine::builder(pool)
            .options(config.storage.clone())
            .initialise()
            .await?;
        info!(table = %config.storage.table_name, "PostgreSQL storage engine ready");
        if config.storage.document_time_to_live_seconds.is_some() {
            spawn_expiry_sweep(
                engine.clone(),
                Duration::from_secs(config.purge_interval_seconds),
            );
        }

        Ok(Self::new(EventStore::new(Arc::new(engine))))
    }
}

// `initialise` already swept once, so the first tick is skipped.
fn spawn_expiry_sweep(engine: PgStorageEngine, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.purge_expired().await {
                Ok(purged) => debug!(purged, "expired records purged"),
                Err(err) => warn!(error = %err, "expiry sweep failed"),
            }
        }
    });
}
