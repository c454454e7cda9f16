//! Type-erased value cells.

use super::list::ListValue;
use super::registry::ValueTypeRegistry;
use crate::error::{Result, StateError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Capability tag declared by every value type.
///
/// Aggregation dispatches on this instead of probing the concrete type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Merged by overwrite (last write wins).
    Scalar,
    /// Merged by appending items.
    List,
}

/// A concrete type that can live inside a [`ValueCell`].
///
/// `TYPE_NAME` must be unique across the process; it identifies the type in
/// persisted records. List types set `KIND` to [`ValueKind::List`] and return
/// themselves from `as_list` / `as_list_mut`.
pub trait StateValue:
    Any + Clone + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    const TYPE_NAME: &'static str;

    const KIND: ValueKind = ValueKind::Scalar;

    fn as_list(&self) -> Option<&dyn ListValue> {
        None
    }

    fn as_list_mut(&mut self) -> Option<&mut dyn ListValue> {
        None
    }
}

/// Runtime identity of a value type.
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
    kind: ValueKind,
}

impl ValueType {
    pub fn of<T: StateValue>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::TYPE_NAME,
            kind: T::KIND,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_list(&self) -> bool {
        self.kind == ValueKind::List
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self.name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Object-safe view over any [`StateValue`].
pub(crate) trait ErasedValue: Send + Sync {
    fn value_type(&self) -> ValueType;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_box(&self) -> Box<dyn ErasedValue>;
    fn dyn_eq(&self, other: &dyn ErasedValue) -> bool;
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn encode(&self) -> Result<Vec<u8>>;
    fn to_json(&self) -> Result<serde_json::Value>;
    fn list(&self) -> Option<&dyn ListValue>;
    fn list_mut(&mut self) -> Option<&mut dyn ListValue>;
}

impl<T: StateValue> ErasedValue for T {
    fn value_type(&self) -> ValueType {
        ValueType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn list(&self) -> Option<&dyn ListValue> {
        <T as StateValue>::as_list(self)
    }

    fn list_mut(&mut self) -> Option<&mut dyn ListValue> {
        <T as StateValue>::as_list_mut(self)
    }
}

/// Holds exactly one value of some registered type, or nothing.
///
/// Typed reads never panic: asking for the wrong type yields `None`.
#[derive(Default)]
pub struct ValueCell {
    value: Option<Box<dyn ErasedValue>>,
}

impl ValueCell {
    pub fn new<T: StateValue>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    /// A cell with no type assigned.
    pub fn empty() -> Self {
        Self { value: None }
    }

    /// Replace the contents with `value`, changing the cell's type.
    pub fn initialize_as<T: StateValue>(&mut self, value: T) {
        self.value = Some(Box::new(value));
    }

    pub fn get<T: StateValue>(&self) -> Option<&T> {
        self.value.as_deref()?.as_any().downcast_ref::<T>()
    }

    /// Typed read that reports what the cell actually holds.
    pub fn try_get<T: StateValue>(&self) -> Result<&T> {
        self.get::<T>().ok_or_else(|| StateError::TypeMismatch {
            expected: T::TYPE_NAME.to_string(),
            got: self.type_name().unwrap_or("<empty>").to_string(),
        })
    }

    pub fn get_mut<T: StateValue>(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn is_a<T: StateValue>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value.as_deref().map(|v| v.value_type())
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.value_type().map(|t| t.name())
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.value_type().map(|t| t.kind())
    }

    /// True if both cells hold a value of the same concrete type.
    pub fn same_type(&self, other: &ValueCell) -> bool {
        match (self.value_type(), other.value_type()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_list(&self) -> Option<&dyn ListValue> {
        self.value.as_deref()?.list()
    }

    pub fn as_list_mut(&mut self) -> Option<&mut dyn ListValue> {
        self.value.as_deref_mut()?.list_mut()
    }

    /// Take the value out, leaving the cell empty.
    pub fn take<T: StateValue>(&mut self) -> Option<T> {
        let value = self.get::<T>()?.clone();
        self.value = None;
        Some(value)
    }

    /// Encode as `(type name, MessagePack payload)`.
    pub fn encode(&self) -> Result<Option<(&'static str, Vec<u8>)>> {
        match self.value.as_deref() {
            Some(value) => Ok(Some((value.value_type().name(), value.encode()?))),
            None => Ok(None),
        }
    }

    /// JSON rendering of the contained value, for inspection and export.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self.value.as_deref() {
            Some(value) => Ok(serde_json::json!({
                "type": value.value_type().name(),
                "value": value.to_json()?,
            })),
            None => Ok(serde_json::Value::Null),
        }
    }
}

impl Clone for ValueCell {
    fn clone(&self) -> Self {
        Self {
            value: self.value.as_deref().map(|v| v.clone_box()),
        }
    }
}

impl PartialEq for ValueCell {
    fn eq(&self, other: &Self) -> bool {
        match (self.value.as_deref(), other.value.as_deref()) {
            (Some(a), Some(b)) => a.dyn_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_deref() {
            Some(value) => {
                write!(f, "{}(", value.value_type().name())?;
                value.fmt_debug(f)?;
                write!(f, ")")
            }
            None => write!(f, "Empty"),
        }
    }
}

#[derive(Serialize)]
struct EncodedCellRef<'a> {
    value_type: Option<&'a str>,
    payload: Vec<u8>,
}

#[derive(Deserialize)]
struct EncodedCell {
    value_type: Option<String>,
    payload: Vec<u8>,
}

impl Serialize for ValueCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let encoded = match self.encode().map_err(serde::ser::Error::custom)? {
            Some((name, payload)) => EncodedCellRef {
                value_type: Some(name),
                payload,
            },
            None => EncodedCellRef {
                value_type: None,
                payload: Vec::new(),
            },
        };
        encoded.serialize(serializer)
    }
}

/// Decoding resolves the type name through the global [`ValueTypeRegistry`].
impl<'de> Deserialize<'de> for ValueCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = EncodedCell::deserialize(deserializer)?;
        match encoded.value_type {
            Some(name) => ValueTypeRegistry::global()
                .decode(&name, &encoded.payload)
                .map_err(serde::de::Error::custom),
            None => Ok(ValueCell::empty()),
        }
    }
}
