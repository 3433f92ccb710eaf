//! Event record model: events to append and persisted events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::type_map::{SerializationTypeMap, TypeKey};

/// Where a payload's discriminator comes from.
#[derive(Debug, Clone, PartialEq)]
enum PayloadType {
    /// Serialized from a Rust value; the type map names it.
    Typed(TypeKey),
    /// Supplied already serialized, with an explicit discriminator.
    Named(String),
}

/// A serialized body or metadata value together with its type identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    kind: PayloadType,
    data: serde_json::Value,
}

impl Payload {
    /// Serializes `value` and remembers its Rust type.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Serialization` if `value` cannot be
    /// represented as JSON.
    pub fn new<T: Serialize + 'static>(value: &T) -> Result<Self, EventStoreError> {
        Ok(Self {
            kind: PayloadType::Typed(TypeKey::of::<T>()),
            data: serde_json::to_value(value)?,
        })
    }

    /// Wraps an already-serialized value with an explicit discriminator.
    #[must_use]
    pub fn named(type_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: PayloadType::Named(type_name.into()),
            data,
        }
    }

    /// The serialized value.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Resolves the discriminator to persist for this payload.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::UnregisteredType` if the type map has no
    /// name for a typed payload, or `EventStoreError::Validation` if an
    /// explicit discriminator is blank.
    pub fn type_name(&self, type_map: &dyn SerializationTypeMap) -> Result<String, EventStoreError> {
        match &self.kind {
            PayloadType::Typed(key) => type_map
                .name_from_type(*key)
                .ok_or_else(|| EventStoreError::UnregisteredType(key.rust_name().to_owned())),
            PayloadType::Named(name) if name.trim().is_empty() => Err(
                EventStoreError::Validation("payload type name must not be empty".into()),
            ),
            PayloadType::Named(name) => Ok(name.clone()),
        }
    }
}

/// An event to append. Supplied by the caller; never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// Caller-assigned unique event identifier.
    pub event_id: Uuid,
    /// Domain payload.
    pub body: Payload,
    /// Optional auxiliary payload.
    pub metadata: Option<Payload>,
}

impl EventData {
    /// Creates an event with no metadata.
    #[must_use]
    pub fn new(event_id: Uuid, body: Payload) -> Self {
        Self {
            event_id,
            body,
            metadata: None,
        }
    }

    /// Creates an event by serializing a typed body.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Serialization` if `body` cannot be serialized.
    pub fn typed<T: Serialize + 'static>(event_id: Uuid, body: &T) -> Result<Self, EventStoreError> {
        Ok(Self::new(event_id, Payload::new(body)?))
    }

    /// Attaches metadata to the event.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the persisted form of this event at `event_number` in `stream_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload discriminator cannot be resolved.
    pub fn into_storage_event(
        self,
        stream_id: &str,
        event_number: i64,
        type_map: &dyn SerializationTypeMap,
    ) -> Result<StorageEvent, EventStoreError> {
        let body_type = self.body.type_name(type_map)?;
        let (metadata, metadata_type) = match self.metadata {
            Some(metadata) => {
                let name = metadata.type_name(type_map)?;
                (Some(metadata.data), Some(name))
            }
            None => (None, None),
        };

        Ok(StorageEvent {
            stream_id: stream_id.to_owned(),
            event_number,
            event_id: self.event_id,
            body: self.body.data,
            body_type,
            metadata,
            metadata_type,
            time_to_live_seconds: None,
        })
    }
}

/// A persisted event. Created once by a successful append and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Stream this event belongs to.
    pub stream_id: String,
    /// 1-based position within the stream.
    pub event_number: i64,
    /// Caller-assigned unique event identifier.
    pub event_id: Uuid,
    /// Serialized domain payload.
    pub body: serde_json::Value,
    /// Discriminator of the body's type.
    pub body_type: String,
    /// Serialized auxiliary payload.
    pub metadata: Option<serde_json::Value>,
    /// Discriminator of the metadata's type.
    pub metadata_type: Option<String>,
    /// Record time-to-live, when the backend applies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live_seconds: Option<i32>,
}

impl StorageEvent {
    /// Deserializes the body as `T` without checking the discriminator.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Serialization` if the body does not fit `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, EventStoreError> {
        Ok(T::deserialize(&self.body)?)
    }

    /// Deserializes the metadata as `T`, if present.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Serialization` if the metadata does not fit `T`.
    pub fn metadata_as<T: DeserializeOwned>(&self) -> Result<Option<T>, EventStoreError> {
        self.metadata
            .as_ref()
            .map(|m| T::deserialize(m).map_err(EventStoreError::from))
            .transpose()
    }

    /// Returns `true` when the type map resolves the body discriminator to `T`.
    #[must_use]
    pub fn body_is<T: ?Sized + 'static>(&self, type_map: &dyn SerializationTypeMap) -> bool {
        type_map
            .name_from_type(TypeKey::of::<T>())
            .is_some_and(|name| name == self.body_type)
    }

    /// Deserializes the body as `T` after checking its discriminator.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::UnregisteredType` if the discriminator does
    /// not resolve to `T`, or `EventStoreError::Serialization` if the body
    /// does not fit `T`.
    pub fn decode_body<T: DeserializeOwned + 'static>(
        &self,
        type_map: &dyn SerializationTypeMap,
    ) -> Result<T, EventStoreError> {
        if type_map.type_from_name(&self.body_type) != Some(std::any::TypeId::of::<T>()) {
            return Err(EventStoreError::UnregisteredType(format!(
                "body type {} does not resolve to {}",
                self.body_type,
                std::any::type_name::<T>()
            )));
        }
        self.body_as()
    }
}
