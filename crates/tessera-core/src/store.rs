//! Event store façade.
//!
//! The façade validates arguments, decides event numbers and resolves payload
//! discriminators, then hands a single request to the configured engine. It
//! never retries: a concurrency conflict goes straight back to the caller,
//! who re-reads the stream and decides what to do.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::engine::StorageEngine;
use crate::error::EventStoreError;
use crate::event::{EventData, StorageEvent};
use crate::type_map::{DefaultTypeMap, SerializationTypeMap, TypeKey};

/// Entry point for appending, reading and deleting event streams.
#[derive(Clone)]
pub struct EventStore {
    engine: Arc<dyn StorageEngine>,
    type_map: Arc<dyn SerializationTypeMap>,
}

impl EventStore {
    /// Creates a store over `engine` using the [`DefaultTypeMap`].
    #[must_use]
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_type_map(engine, Arc::new(DefaultTypeMap::new()))
    }

    /// Creates a store over `engine` with an explicit type-name map.
    #[must_use]
    pub fn with_type_map(
        engine: Arc<dyn StorageEngine>,
        type_map: Arc<dyn SerializationTypeMap>,
    ) -> Self {
        Self { engine, type_map }
    }

    /// The type-name map used to resolve payload discriminators.
    #[must_use]
    pub fn type_map(&self) -> &dyn SerializationTypeMap {
        self.type_map.as_ref()
    }

    /// Appends `events` to `stream_id`, numbering them
    /// `expected_version + 1, + 2, …` in input order.
    ///
    /// The whole batch goes to the engine in one request and is persisted
    /// entirely or not at all.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id or a
    /// negative expected version, `EventStoreError::UnregisteredType` when a
    /// payload type has no discriminator, and the engine's error unchanged
    /// otherwise (typically `EventStoreError::ConcurrencyConflict`).
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn append_to_stream(
        &self,
        stream_id: &str,
        expected_version: i64,
        events: Vec<EventData>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        validate_stream_id(stream_id)?;
        if expected_version < 0 {
            debug!("rejecting negative expected version");
            return Err(EventStoreError::Validation(format!(
                "expected version must not be negative, got {expected_version}"
            )));
        }

        let mut storage_events = Vec::with_capacity(events.len());
        let mut event_number = expected_version;
        for event in events {
            event_number = event_number.checked_add(1).ok_or_else(|| {
                EventStoreError::Validation("event number overflows i64".into())
            })?;
            storage_events.push(event.into_storage_event(
                stream_id,
                event_number,
                self.type_map.as_ref(),
            )?);
        }

        match self
            .engine
            .append_to_stream(stream_id, storage_events.clone())
            .await
        {
            Ok(()) => Ok(storage_events),
            Err(err) => {
                if err.is_concurrency_conflict() {
                    info!(%err, "append rejected");
                }
                Err(err)
            }
        }
    }

    /// Reads the whole stream in ascending event-number order.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id, or the
    /// engine's error unchanged.
    pub async fn read_stream_forwards(
        &self,
        stream_id: &str,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        self.read_stream_forwards_range(stream_id, 1, i64::MAX).await
    }

    /// Reads events numbered `[start, start + count)` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id, a start
    /// below 1 or a negative count, or the engine's error unchanged.
    #[instrument(skip(self))]
    pub async fn read_stream_forwards_range(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        validate_stream_id(stream_id)?;
        if start < 1 {
            debug!(start, "rejecting start position below 1");
            return Err(EventStoreError::Validation(format!(
                "start position must be at least 1, got {start}"
            )));
        }
        if count < 0 {
            debug!(count, "rejecting negative count");
            return Err(EventStoreError::Validation(format!(
                "number of events to read must not be negative, got {count}"
            )));
        }
        self.engine.read_stream_forwards(stream_id, start, count).await
    }

    /// Scans `stream_id` from its newest event backward and returns, in
    /// ascending order, every event from the most recent one satisfying
    /// `read_from_here` through the newest. Without a match the whole stream
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id, or the
    /// engine's error unchanged.
    #[instrument(skip(self, read_from_here))]
    pub async fn read_stream_forwards_from_last<P>(
        &self,
        stream_id: &str,
        read_from_here: P,
    ) -> Result<Vec<StorageEvent>, EventStoreError>
    where
        P: Fn(&StorageEvent) -> bool + Send + Sync,
    {
        validate_stream_id(stream_id)?;
        self.engine
            .read_stream_forwards_from_last(stream_id, &read_from_here)
            .await
    }

    /// Reads from the most recent event whose body is an `S` onward.
    ///
    /// This is the snapshot rehydration path: pass the snapshot type and
    /// receive the latest snapshot followed by every event after it.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id, or the
    /// engine's error unchanged.
    pub async fn read_stream_forwards_from_last_of<S: ?Sized + 'static>(
        &self,
        stream_id: &str,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let snapshot_type = self.type_map.name_from_type(TypeKey::of::<S>());
        if snapshot_type.is_none() {
            debug!(
                snapshot = std::any::type_name::<S>(),
                "snapshot type has no name, reading whole stream"
            );
        }
        self.read_stream_forwards_from_last(stream_id, move |event| {
            snapshot_type.as_deref() == Some(event.body_type.as_str())
        })
        .await
    }

    /// Deletes every event of `stream_id`.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` for an empty stream id, or the
    /// engine's error unchanged.
    #[instrument(skip(self))]
    pub async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError> {
        validate_stream_id(stream_id)?;
        self.engine.delete_stream(stream_id).await
    }

    /// Reports whether the underlying engine is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.engine.is_healthy().await
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore").finish_non_exhaustive()
    }
}

fn validate_stream_id(stream_id: &str) -> Result<(), EventStoreError> {
    if stream_id.trim().is_empty() {
        debug!("rejecting empty stream id");
        return Err(EventStoreError::Validation(
            "stream id must not be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::*;
    use crate::in_memory::InMemoryStorageEngine;
    use crate::type_map::ConfigurableTypeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        order_id: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderDispatched {
        order_id: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderSnapshot {
        order_id: String,
    }

    fn store() -> EventStore {
        EventStore::with_type_map(
            Arc::new(InMemoryStorageEngine::new()),
            Arc::new(
                ConfigurableTypeMap::new()
                    .register::<OrderCreated>("OrderCreated")
                    .register::<OrderDispatched>("OrderDispatched")
                    .register::<OrderSnapshot>("OrderSnapshot"),
            ),
        )
    }

    fn created(order_id: &str) -> EventData {
        EventData::typed(
            Uuid::new_v4(),
            &OrderCreated {
                order_id: order_id.into(),
            },
        )
        .unwrap()
    }

    fn dispatched(order_id: &str) -> EventData {
        EventData::typed(
            Uuid::new_v4(),
            &OrderDispatched {
                order_id: order_id.into(),
            },
        )
        .unwrap()
    }

    fn snapshot(order_id: &str) -> EventData {
        EventData::typed(
            Uuid::new_v4(),
            &OrderSnapshot {
                order_id: order_id.into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_order_lifecycle_scenario() {
        let store = store();

        let first = store
            .append_to_stream("order-1", 0, vec![created("order-1")])
            .await
            .unwrap();
        assert_eq!(first[0].event_number, 1);

        let second = store
            .append_to_stream("order-1", 1, vec![dispatched("order-1")])
            .await
            .unwrap();
        assert_eq!(second[0].event_number, 2);

        let stream = store.read_stream_forwards("order-1").await.unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[0].body_type, "OrderCreated");
        assert_eq!(stream[0].event_number, 1);
        assert_eq!(stream[1].body_type, "OrderDispatched");
        assert_eq!(stream[1].event_number, 2);

        let stale = store
            .append_to_stream("order-1", 1, vec![dispatched("order-1")])
            .await;
        assert!(stale.unwrap_err().is_concurrency_conflict());
        assert_eq!(store.read_stream_forwards("order-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_numbers_batch_after_expected_version() {
        let store = store();
        store
            .append_to_stream("s", 0, vec![created("s"), dispatched("s")])
            .await
            .unwrap();

        let appended = store
            .append_to_stream("s", 2, vec![dispatched("s"), dispatched("s"), dispatched("s")])
            .await
            .unwrap();

        let numbers: Vec<i64> = appended.iter().map(|e| e.event_number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_empty_stream_id_is_rejected_everywhere() {
        let store = store();

        assert!(matches!(
            store.append_to_stream("", 0, vec![created("x")]).await,
            Err(EventStoreError::Validation(_))
        ));
        assert!(matches!(
            store.read_stream_forwards("  ").await,
            Err(EventStoreError::Validation(_))
        ));
        assert!(matches!(
            store.read_stream_forwards_from_last("", |_| true).await,
            Err(EventStoreError::Validation(_))
        ));
        assert!(matches!(
            store.delete_stream("").await,
            Err(EventStoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_arguments_are_rejected() {
        let store = store();

        assert!(matches!(
            store.append_to_stream("s", -1, vec![created("s")]).await,
            Err(EventStoreError::Validation(_))
        ));
        assert!(matches!(
            store.read_stream_forwards_range("s", 0, 10).await,
            Err(EventStoreError::Validation(_))
        ));
        assert!(matches!(
            store.read_stream_forwards_range("s", 1, -1).await,
            Err(EventStoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_payload_type_fails_before_engine() {
        let store = store();
        let unknown = EventData::typed(Uuid::new_v4(), &42_u32).unwrap();

        let result = store.append_to_stream("s", 0, vec![unknown]).await;

        assert!(matches!(result, Err(EventStoreError::UnregisteredType(_))));
        assert!(store.read_stream_forwards("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_range_returns_half_open_window() {
        let store = store();
        let events = (0..6).map(|_| dispatched("s")).collect();
        store.append_to_stream("s", 0, events).await.unwrap();

        let window = store.read_stream_forwards_range("s", 3, 2).await.unwrap();

        let numbers: Vec<i64> = window.iter().map(|e| e.event_number).collect();
        assert_eq!(numbers, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_read_from_last_snapshot_excludes_older_events() {
        let store = store();
        store
            .append_to_stream(
                "order-1",
                0,
                vec![
                    created("order-1"),
                    snapshot("order-1"),
                    dispatched("order-1"),
                    snapshot("order-1"),
                    dispatched("order-1"),
                ],
            )
            .await
            .unwrap();

        let events = store
            .read_stream_forwards_from_last_of::<OrderSnapshot>("order-1")
            .await
            .unwrap();

        let numbers: Vec<i64> = events.iter().map(|e| e.event_number).collect();
        assert_eq!(numbers, vec![4, 5]);
        assert_eq!(events[0].body_type, "OrderSnapshot");
    }

    #[tokio::test]
    async fn test_read_from_last_without_snapshot_returns_whole_stream() {
        let store = store();
        store
            .append_to_stream("order-1", 0, vec![created("order-1"), dispatched("order-1")])
            .await
            .unwrap();

        let events = store
            .read_stream_forwards_from_last_of::<OrderSnapshot>("order-1")
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_number, 1);
    }

    #[tokio::test]
    async fn test_delete_stream_leaves_other_streams_intact() {
        let store = store();
        store
            .append_to_stream("keep", 0, vec![created("keep")])
            .await
            .unwrap();
        store
            .append_to_stream("drop", 0, vec![created("drop"), dispatched("drop")])
            .await
            .unwrap();

        store.delete_stream("drop").await.unwrap();

        assert!(store.read_stream_forwards("drop").await.unwrap().is_empty());
        assert_eq!(store.read_stream_forwards("keep").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_stream_starts_again_at_version_zero() {
        let store = store();
        store
            .append_to_stream("s", 0, vec![created("s")])
            .await
            .unwrap();
        store.delete_stream("s").await.unwrap();

        let appended = store
            .append_to_stream("s", 0, vec![created("s")])
            .await
            .unwrap();

        assert_eq!(appended[0].event_number, 1);
    }

    #[tokio::test]
    async fn test_is_healthy_forwards_engine_health() {
        assert!(store().is_healthy().await);
    }
}
