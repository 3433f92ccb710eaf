//! Façade behaviour observed through the test engines.

use std::sync::Arc;

use serde_json::json;
use tessera_core::engine::StorageEngine;
use tessera_core::error::EventStoreError;
use tessera_core::event::{EventData, Payload, StorageEvent};
use tessera_core::store::EventStore;
use tessera_test_support::events::{
    OrderCreated, OrderSnapshot, fixture_type_map, order_created, order_dispatched,
    order_snapshot, with_correlation,
};
use tessera_test_support::{
    ConflictingStorageEngine, EmptyStorageEngine, FailingStorageEngine, RecordingStorageEngine,
};
use uuid::Uuid;

fn store_over(engine: Arc<dyn StorageEngine>) -> EventStore {
    EventStore::with_type_map(engine, Arc::new(fixture_type_map()))
}

fn stored(stream_id: &str, event_number: i64, body_type: &str) -> StorageEvent {
    StorageEvent {
        stream_id: stream_id.to_owned(),
        event_number,
        event_id: Uuid::new_v4(),
        body: json!({"order_id": stream_id}),
        body_type: body_type.to_owned(),
        metadata: None,
        metadata_type: None,
        time_to_live_seconds: None,
    }
}

#[tokio::test]
async fn test_append_hands_engine_one_numbered_batch() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());
    let created = with_correlation(order_created("order-1"), "corr-7");
    let created_id = created.event_id;

    // Act
    let result = store
        .append_to_stream("order-1", 3, vec![created, order_dispatched("order-1")])
        .await;

    // Assert
    assert!(result.is_ok());

    let appended = engine.appended_events();
    assert_eq!(appended.len(), 1);

    let (stream_id, events) = &appended[0];
    assert_eq!(stream_id, "order-1");
    assert_eq!(events.len(), 2);

    let first = &events[0];
    assert_eq!(first.stream_id, "order-1");
    assert_eq!(first.event_number, 4);
    assert_eq!(first.event_id, created_id);
    assert_eq!(first.body_type, "OrderCreated");
    assert_eq!(first.body, json!({"order_id": "order-1"}));
    assert_eq!(first.metadata_type.as_deref(), Some("TestMetadata"));
    assert_eq!(first.metadata, Some(json!({"correlation_id": "corr-7"})));

    assert_eq!(events[1].event_number, 5);
    assert_eq!(events[1].body_type, "OrderDispatched");
}

#[tokio::test]
async fn test_append_returns_the_events_it_persisted() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());

    // Act
    let persisted = store
        .append_to_stream("order-1", 0, vec![order_created("order-1")])
        .await
        .unwrap();

    // Assert
    assert_eq!(persisted, engine.appended_events()[0].1);
}

#[tokio::test]
async fn test_append_accepts_pre_serialized_payloads() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());
    let event = EventData::new(
        Uuid::new_v4(),
        Payload::named("LegacyOrderImported", json!({"legacy_id": 42})),
    );

    // Act
    store.append_to_stream("order-1", 0, vec![event]).await.unwrap();

    // Assert
    let (_, events) = &engine.appended_events()[0];
    assert_eq!(events[0].body_type, "LegacyOrderImported");
    assert_eq!(events[0].body, json!({"legacy_id": 42}));
}

#[tokio::test]
async fn test_append_with_unregistered_type_never_reaches_engine() {
    // Arrange
    #[derive(serde::Serialize)]
    struct Unknown {
        value: u8,
    }
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());
    let event = EventData::typed(Uuid::new_v4(), &Unknown { value: 1 }).unwrap();

    // Act
    let result = store.append_to_stream("order-1", 0, vec![event]).await;

    // Assert
    match result {
        Err(EventStoreError::UnregisteredType(_)) => {}
        other => panic!("expected UnregisteredType, got {other:?}"),
    }
    assert!(engine.appended_events().is_empty());
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_engine() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());

    // Act
    let blank = store
        .append_to_stream("  ", 0, vec![order_created("x")])
        .await;
    let negative = store
        .append_to_stream("order-1", -1, vec![order_created("x")])
        .await;
    let bad_start = store.read_stream_forwards_range("order-1", 0, 1).await;
    let bad_count = store.read_stream_forwards_range("order-1", 1, -1).await;
    let bad_delete = store.delete_stream("").await;

    // Assert
    let results = [
        blank.map(|_| ()),
        negative.map(|_| ()),
        bad_start.map(|_| ()),
        bad_count.map(|_| ()),
        bad_delete,
    ];
    for result in results {
        match result {
            Err(EventStoreError::Validation(_)) => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }
    assert!(engine.appended_events().is_empty());
    assert!(engine.deleted_streams().is_empty());
}

#[tokio::test]
async fn test_engine_conflict_is_returned_unchanged() {
    // Arrange
    let store = store_over(Arc::new(ConflictingStorageEngine));

    // Act
    let result = store
        .append_to_stream("order-1", 2, vec![order_created("order-1")])
        .await;

    // Assert
    match result {
        Err(EventStoreError::ConcurrencyConflict {
            stream_id,
            expected,
            actual,
        }) => {
            assert_eq!(stream_id, "order-1");
            assert_eq!(expected, 2);
            assert_eq!(actual, None);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_backend_failures_propagate() {
    // Arrange
    let store = store_over(Arc::new(FailingStorageEngine));

    // Act
    let append = store
        .append_to_stream("order-1", 0, vec![order_created("order-1")])
        .await;
    let read = store.read_stream_forwards("order-1").await;
    let delete = store.delete_stream("order-1").await;

    // Assert
    assert!(matches!(append, Err(EventStoreError::Backend(_))));
    assert!(matches!(read, Err(EventStoreError::Backend(_))));
    assert!(matches!(delete, Err(EventStoreError::Backend(_))));
    assert!(!store.is_healthy().await);
}

#[tokio::test]
async fn test_read_stream_forwards_on_missing_stream_is_empty() {
    // Arrange
    let store = store_over(Arc::new(EmptyStorageEngine));

    // Act
    let events = store.read_stream_forwards("nothing-here").await.unwrap();

    // Assert
    assert!(events.is_empty());
    assert!(store.is_healthy().await);
}

#[tokio::test]
async fn test_read_from_last_of_snapshot_uses_mapped_discriminator() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::new(vec![
        stored("order-1", 1, "OrderCreated"),
        stored("order-1", 2, "OrderSnapshot"),
        stored("order-1", 3, "OrderDispatched"),
    ]));
    let store = store_over(engine);

    // Act
    let events = store
        .read_stream_forwards_from_last_of::<OrderSnapshot>("order-1")
        .await
        .unwrap();

    // Assert
    let numbers: Vec<i64> = events.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![2, 3]);
}

#[tokio::test]
async fn test_read_from_last_of_unnamed_type_returns_whole_stream() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::new(vec![
        stored("order-1", 1, "OrderCreated"),
        stored("order-1", 2, "OrderSnapshot"),
    ]));
    let store = store_over(engine);

    // Act
    let events = store
        .read_stream_forwards_from_last_of::<serde_json::Value>("order-1")
        .await
        .unwrap();

    // Assert
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_decoded_events_round_trip_through_type_map() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());
    store
        .append_to_stream(
            "order-9",
            0,
            vec![order_created("order-9"), order_snapshot("order-9", false)],
        )
        .await
        .unwrap();
    let (_, events) = &engine.appended_events()[0];

    // Act
    let created = events[0].decode_body::<OrderCreated>(store.type_map());
    let mismatched = events[1].decode_body::<OrderCreated>(store.type_map());

    // Assert
    assert_eq!(
        created.unwrap(),
        OrderCreated {
            order_id: "order-9".to_owned()
        }
    );
    assert!(matches!(mismatched, Err(EventStoreError::UnregisteredType(_))));
}

#[tokio::test]
async fn test_delete_stream_forwards_to_engine() {
    // Arrange
    let engine = Arc::new(RecordingStorageEngine::default());
    let store = store_over(engine.clone());

    // Act
    store.delete_stream("order-1").await.unwrap();

    // Assert
    assert_eq!(engine.deleted_streams(), vec!["order-1".to_owned()]);
}
