//! Errors raised by the PostgreSQL engine before they reach the façade.

use thiserror::Error;

use tessera_core::error::EventStoreError;

/// Configuration and query failures of [`crate::PgStorageEngine`].
#[derive(Debug, Error)]
pub enum PgStorageError {
    /// The configured table name is not a plain SQL identifier.
    #[error(
        "invalid table name {0:?}: expected letters, digits and underscores, not starting with a digit"
    )]
    InvalidTableName(String),

    /// A size or duration option was zero or negative.
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    /// A round trip to the database failed.
    #[error("{operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl PgStorageError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { operation, source }
    }
}

impl From<PgStorageError> for EventStoreError {
    fn from(err: PgStorageError) -> Self {
        match err {
            PgStorageError::Query { .. } => EventStoreError::backend(err),
            PgStorageError::InvalidTableName(_) | PgStorageError::NonPositive(_) => {
                EventStoreError::Validation(err.to_string())
            }
        }
    }
}

/// Returns `true` when `err` means a concurrent writer won: a unique
/// violation (`23505`).
pub(crate) fn is_conflict_signature(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code == "23505"),
        _ => false,
    }
}
