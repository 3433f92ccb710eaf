//! Event store error types.

use thiserror::Error;

/// Boxed source error carried by [`EventStoreError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level event store error type.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An argument was rejected before any I/O took place.
    #[error("validation error: {0}")]
    Validation(String),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on stream {stream_id}: expected version {expected}, found {}",
        .actual.map_or_else(|| "a newer version".to_owned(), |v| v.to_string())
    )]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream_id: String,
        /// The version the writer expected.
        expected: i64,
        /// The version found, when the backend reports it.
        actual: Option<i64>,
    },

    /// The type-name map has no name for a payload type.
    #[error("unregistered payload type: {0}")]
    UnregisteredType(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other storage backend failure.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),
}

impl EventStoreError {
    /// Wraps a backend failure, preserving it as the error source.
    pub fn backend(source: impl Into<BoxError>) -> Self {
        Self::Backend(source.into())
    }

    /// Returns `true` for [`EventStoreError::ConcurrencyConflict`].
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_includes_actual_version_when_known() {
        let err = EventStoreError::ConcurrencyConflict {
            stream_id: "order-1".into(),
            expected: 1,
            actual: Some(2),
        };

        assert_eq!(
            err.to_string(),
            "concurrency conflict on stream order-1: expected version 1, found 2"
        );
        assert!(err.is_concurrency_conflict());
    }

    #[test]
    fn test_conflict_message_without_actual_version() {
        let err = EventStoreError::ConcurrencyConflict {
            stream_id: "order-1".into(),
            expected: 0,
            actual: None,
        };

        assert_eq!(
            err.to_string(),
            "concurrency conflict on stream order-1: expected version 0, found a newer version"
        );
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let err = EventStoreError::backend("connection refused");

        assert_eq!(err.to_string(), "backend error: connection refused");
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_concurrency_conflict());
    }
}
