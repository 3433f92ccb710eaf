//! Backend-agnostic persisted record shape.
//!
//! Durable engines store one `EventRecord` per event. The record id is
//! `"{stream_id}:{event_number}"`, which makes a duplicate position within a
//! stream a key collision in any document or row store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::StorageEvent;

/// One persisted event as a flat document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// `"{stream_id}:{event_number}"`.
    pub id: String,
    /// Caller-assigned event identifier.
    pub event_id: Uuid,
    /// Serialized body.
    pub body: serde_json::Value,
    /// Body discriminator.
    pub body_type: String,
    /// Serialized metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Metadata discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_type: Option<String>,
    /// Partition key.
    pub stream_id: String,
    /// Position within the stream.
    pub event_number: i64,
    /// Record time-to-live in seconds.
    #[serde(rename = "ttl", default, skip_serializing_if = "Option::is_none")]
    pub time_to_live_seconds: Option<i32>,
}

impl EventRecord {
    /// Formats the record id for a stream position.
    #[must_use]
    pub fn record_id(stream_id: &str, event_number: i64) -> String {
        format!("{stream_id}:{event_number}")
    }

    /// Builds the record for `event`, stamping `time_to_live_seconds`.
    #[must_use]
    pub fn from_storage_event(event: StorageEvent, time_to_live_seconds: Option<i32>) -> Self {
        Self {
            id: Self::record_id(&event.stream_id, event.event_number),
            event_id: event.event_id,
            body: event.body,
            body_type: event.body_type,
            metadata: event.metadata,
            metadata_type: event.metadata_type,
            stream_id: event.stream_id,
            event_number: event.event_number,
            time_to_live_seconds,
        }
    }
}

impl From<EventRecord> for StorageEvent {
    fn from(record: EventRecord) -> Self {
        Self {
            stream_id: record.stream_id,
            event_number: record.event_number,
            event_id: record.event_id,
            body: record.body,
            body_type: record.body_type,
            metadata: record.metadata,
            metadata_type: record.metadata_type,
            time_to_live_seconds: record.time_to_live_seconds,
        }
    }
}
