//! Value cells and the value types they can hold.
//!
//! A [`ValueCell`] carries one value of any registered [`StateValue`] type.
//! Each type declares a [`ValueKind`]; list kinds accumulate on merge through
//! [`ListValue::aggregate_items`], scalar kinds are overwritten.

mod builtin;
mod cell;
mod list;
mod registry;

pub use builtin::{Name, Rotator, TagValue, Transform, Vector};
pub use cell::{StateValue, ValueCell, ValueKind, ValueType};
pub use list::{ItemList, ListValue};
pub use registry::{register_value_type, ValueTypeRegistry};
