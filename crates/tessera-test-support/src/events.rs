//! Event fixtures shared by the façade, engine and server tests.

use serde::{Deserialize, Serialize};
use tessera_core::event::{EventData, Payload};
use tessera_core::type_map::ConfigurableTypeMap;
use uuid::Uuid;

/// An order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
}

/// An order left the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDispatched {
    pub order_id: String,
    pub carrier: String,
}

/// Folded state of an order up to some event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub dispatched: bool,
}

/// Metadata attached to fixture events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMetadata {
    pub correlation_id: String,
}

/// Type map naming every fixture type after its struct.
#[must_use]
pub fn fixture_type_map() -> ConfigurableTypeMap {
    ConfigurableTypeMap::new()
        .register::<OrderCreated>("OrderCreated")
        .register::<OrderDispatched>("OrderDispatched")
        .register::<OrderSnapshot>("OrderSnapshot")
        .register::<TestMetadata>("TestMetadata")
}

/// A fresh, unique stream id.
#[must_use]
pub fn new_stream_id() -> String {
    format!("order-{}", Uuid::new_v4())
}

/// An `OrderCreated` event with a new id.
///
/// # Panics
///
/// Panics if the fixture cannot be serialized.
#[must_use]
pub fn order_created(order_id: &str) -> EventData {
    EventData::typed(
        Uuid::new_v4(),
        &OrderCreated {
            order_id: order_id.to_owned(),
        },
    )
    .unwrap()
}

/// An `OrderDispatched` event with a new id.
///
/// # Panics
///
/// Panics if the fixture cannot be serialized.
#[must_use]
pub fn order_dispatched(order_id: &str) -> EventData {
    EventData::typed(
        Uuid::new_v4(),
        &OrderDispatched {
            order_id: order_id.to_owned(),
            carrier: "postal".to_owned(),
        },
    )
    .unwrap()
}

/// An `OrderSnapshot` event with a new id.
///
/// # Panics
///
/// Panics if the fixture cannot be serialized.
#[must_use]
pub fn order_snapshot(order_id: &str, dispatched: bool) -> EventData {
    EventData::typed(
        Uuid::new_v4(),
        &OrderSnapshot {
            order_id: order_id.to_owned(),
            dispatched,
        },
    )
    .unwrap()
}

/// Attaches `TestMetadata` carrying `correlation_id` to `event`.
///
/// # Panics
///
/// Panics if the metadata cannot be serialized.
#[must_use]
pub fn with_correlation(event: EventData, correlation_id: &str) -> EventData {
    event.with_metadata(
        Payload::new(&TestMetadata {
            correlation_id: correlation_id.to_owned(),
        })
        .unwrap(),
    )
}
