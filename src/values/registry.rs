//! Registry of value types by name, used to decode persisted cells.

use super::builtin::{Name, Rotator, TagValue, Transform, Vector};
use super::cell::{StateValue, ValueCell, ValueType};
use super::list::ItemList;
use crate::error::{Result, StateError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

type DecodeFn = fn(&[u8]) -> Result<ValueCell>;

#[derive(Clone, Copy)]
struct RegisteredType {
    value_type: ValueType,
    decode: DecodeFn,
}

fn decode_as<T: StateValue>(payload: &[u8]) -> Result<ValueCell> {
    let value: T = rmp_serde::from_slice(payload)?;
    Ok(ValueCell::new(value))
}

/// Maps `StateValue::TYPE_NAME` to the concrete type.
///
/// The kind (scalar or list) is captured at registration time.
pub struct ValueTypeRegistry {
    types: RwLock<HashMap<&'static str, RegisteredType>>,
}

impl ValueTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with every built-in type registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register::<bool>();
        registry.register::<i64>();
        registry.register::<f64>();
        registry.register::<String>();
        registry.register::<Name>();
        registry.register::<Vector>();
        registry.register::<Rotator>();
        registry.register::<Transform>();
        registry.register::<TagValue>();
        registry.register::<ItemList>();
        registry
    }

    /// The process-wide registry consulted when cells are deserialized.
    pub fn global() -> &'static ValueTypeRegistry {
        static GLOBAL: OnceLock<ValueTypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ValueTypeRegistry::with_builtins)
    }

    /// Register `T`. Re-registering the same type is a no-op; a different
    /// type claiming an existing name is rejected.
    pub fn register<T: StateValue>(&self) -> bool {
        let value_type = ValueType::of::<T>();
        let mut types = self.types.write();

        if let Some(existing) = types.get(T::TYPE_NAME) {
            if existing.value_type == value_type {
                return true;
            }
            warn!(
                type_name = T::TYPE_NAME,
                "Value type name already registered to a different type"
            );
            return false;
        }

        types.insert(
            T::TYPE_NAME,
            RegisteredType {
                value_type,
                decode: decode_as::<T>,
            },
        );
        true
    }

    pub fn lookup(&self, name: &str) -> Option<ValueType> {
        self.types.read().get(name).map(|t| t.value_type)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Decode a MessagePack payload as the type registered under `name`.
    pub fn decode(&self, name: &str, payload: &[u8]) -> Result<ValueCell> {
        // Copy the fn pointer out so nested decodes can take the lock again.
        let decode = self
            .types
            .read()
            .get(name)
            .map(|t| t.decode)
            .ok_or_else(|| StateError::UnknownValueType(name.to_string()))?;
        decode(payload)
    }
}

impl Default for ValueTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a custom value type with the global registry.
pub fn register_value_type<T: StateValue>() -> bool {
    ValueTypeRegistry::global().register::<T>()
}
