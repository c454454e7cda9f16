//! Live state objects held by state categories.

use crate::tag::Tag;
use crate::values::{StateValue, ValueCell, ValueType};
use std::any::Any;
use std::fmt;
use tracing::warn;

/// One facet of an entity's state: a tag plus a value of one fixed type.
pub trait StateObject: Send + Sync + fmt::Debug {
    fn tag(&self) -> &Tag;

    /// The value type this object stores.
    fn value_type(&self) -> ValueType;

    /// The current value, copied into a cell.
    fn current_value(&self) -> ValueCell;

    /// Replace the value from `cell`. A cell of another type is skipped
    /// with a warning and `false` is returned.
    fn apply_value(&mut self, cell: &ValueCell) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_box(&self) -> Box<dyn StateObject>;
}

impl Clone for Box<dyn StateObject> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// The standard state object: holds a single `V`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedState<V: StateValue> {
    tag: Tag,
    value: V,
}

impl<V: StateValue> TypedState<V> {
    pub fn new(tag: Tag, value: V) -> Self {
        Self { tag, value }
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn set(&mut self, value: V) {
        self.value = value;
    }
}

impl<V: StateValue> StateObject for TypedState<V> {
    fn tag(&self) -> &Tag {
        &self.tag
    }

    fn value_type(&self) -> ValueType {
        ValueType::of::<V>()
    }

    fn current_value(&self) -> ValueCell {
        ValueCell::new(self.value.clone())
    }

    fn apply_value(&mut self, cell: &ValueCell) -> bool {
        match cell.get::<V>() {
            Some(value) => {
                self.value = value.clone();
                true
            }
            None => {
                warn!(
                    tag = %self.tag,
                    expected = V::TYPE_NAME,
                    got = cell.type_name().unwrap_or("<none>"),
                    "Value type mismatch; update skipped"
                );
                false
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn StateObject> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_matching_value() {
        let mut state = TypedState::new(Tag::new("State.Open"), false);
        assert!(state.apply_value(&ValueCell::new(true)));
        assert!(*state.get());
        assert_eq!(state.current_value(), ValueCell::new(true));
    }

    #[test]
    fn test_type_mismatch_skipped() {
        let mut state = TypedState::new(Tag::new("State.Open"), false);
        assert!(!state.apply_value(&ValueCell::new(1i64)));
        assert!(!state.apply_value(&ValueCell::empty()));
        assert!(!*state.get());
    }

    #[test]
    fn test_boxed_clone_and_downcast() {
        let boxed: Box<dyn StateObject> = Box::new(TypedState::new(Tag::new("Hp"), 10i64));
        let copy = boxed.clone();
        let typed = copy.as_any().downcast_ref::<TypedState<i64>>().unwrap();
        assert_eq!(*typed.get(), 10);
        assert_eq!(copy.value_type(), ValueType::of::<i64>());
    }
}
