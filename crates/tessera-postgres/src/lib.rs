//! PostgreSQL-backed storage engine for Tessera.
//!
//! Every stream lives in one shared record table, partitioned by
//! `stream_id`. Writes to a stream are serialized by a transaction-scoped
//! advisory lock on the stream id; reads are keyset-paged and lock-free.

pub mod error;
pub mod options;
mod pg_storage_engine;
pub mod schema;

pub use error::PgStorageError;
pub use options::{IsolationLevel, PgStorageOptions};
pub use pg_storage_engine::{PgStorageEngine, PgStorageEngineBuilder};
