//! Type-name maps resolving payload discriminators.
//!
//! Every persisted body and metadata payload carries a string discriminator
//! naming the Rust type it was serialized from. A [`SerializationTypeMap`]
//! decides what that string is for a given type, and which type a stored
//! string refers to.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Identity of a Rust type: its `TypeId` plus its compiler-given name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the type.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified Rust name of the type.
    #[must_use]
    pub fn rust_name(&self) -> &'static str {
        self.name
    }
}

/// Maps payload types to discriminator names and back.
pub trait SerializationTypeMap: Send + Sync {
    /// Returns the discriminator to persist for the given type.
    fn name_from_type(&self, key: TypeKey) -> Option<String>;

    /// Returns the type a persisted discriminator refers to.
    fn type_from_name(&self, name: &str) -> Option<TypeId>;
}

/// Names every type after its fully qualified Rust path.
///
/// Names handed out are remembered so `type_from_name` can resolve them
/// later in the same process.
#[derive(Debug, Default)]
pub struct DefaultTypeMap {
    seen: RwLock<HashMap<String, TypeId>>,
}

impl DefaultTypeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SerializationTypeMap for DefaultTypeMap {
    fn name_from_type(&self, key: TypeKey) -> Option<String> {
        let name = key.rust_name().to_owned();
        if let Ok(mut seen) = self.seen.write() {
            seen.entry(name.clone()).or_insert(key.id());
        }
        Some(name)
    }

    fn type_from_name(&self, name: &str) -> Option<TypeId> {
        self.seen.read().ok()?.get(name).copied()
    }
}

/// A map with explicitly registered names. Unregistered types have no name.
#[derive(Debug, Default, Clone)]
pub struct ConfigurableTypeMap {
    names: HashMap<TypeId, String>,
    types: HashMap<String, TypeId>,
}

impl ConfigurableTypeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` as the discriminator for `T`, replacing any
    /// previous registration of either.
    #[must_use]
    pub fn register<T: ?Sized + 'static>(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let id = TypeId::of::<T>();
        if let Some(previous) = self.names.insert(id, name.clone()) {
            self.types.remove(&previous);
        }
        match self.types.insert(name, id) {
            Some(previous) if previous != id => {
                self.names.remove(&previous);
            }
            _ => {}
        }
        self
    }
}

impl SerializationTypeMap for ConfigurableTypeMap {
    fn name_from_type(&self, key: TypeKey) -> Option<String> {
        self.names.get(&key.id()).cloned()
    }

    fn type_from_name(&self, name: &str) -> Option<TypeId> {
        self.types.get(name).copied()
    }
}
