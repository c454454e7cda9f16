//! The tag-to-types schema consulted when building state categories.

use super::object::{StateObject, TypedState};
use crate::tag::Tag;
use crate::values::{StateValue, ValueType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Describes one value type expected under a tag and how to build its
/// state object.
pub trait TypeDescriptor: Send + Sync {
    fn expected_value_type(&self) -> ValueType;

    /// A new state object for `tag`, holding the type's default value.
    fn create_state_object(&self, tag: &Tag) -> Box<dyn StateObject>;
}

/// Resolves which value types a tag carries.
pub trait SchemaRegistry: Send + Sync {
    /// The expected types for `tag`, in order. Empty if unknown.
    fn expected_types(&self, tag: &Tag) -> Vec<Arc<dyn TypeDescriptor>>;
}

/// Descriptor producing [`TypedState<V>`] objects.
pub struct TypedDescriptor<V: StateValue> {
    default: V,
}

impl<V: StateValue + Default> TypedDescriptor<V> {
    pub fn new() -> Self {
        Self {
            default: V::default(),
        }
    }
}

impl<V: StateValue + Default> Default for TypedDescriptor<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: StateValue> TypedDescriptor<V> {
    pub fn with_default(default: V) -> Self {
        Self { default }
    }
}

impl<V: StateValue> TypeDescriptor for TypedDescriptor<V> {
    fn expected_value_type(&self) -> ValueType {
        ValueType::of::<V>()
    }

    fn create_state_object(&self, tag: &Tag) -> Box<dyn StateObject> {
        Box::new(TypedState::new(tag.clone(), self.default.clone()))
    }
}

/// Map-backed schema. Lookups fall back to the nearest registered parent tag.
#[derive(Clone, Default)]
pub struct MapSchema {
    entries: HashMap<Tag, Vec<Arc<dyn TypeDescriptor>>>,
}

impl MapSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a `V` (starting at `V::default()`) under `tag`.
    pub fn with_type<V: StateValue + Default>(self, tag: impl Into<Tag>) -> Self {
        self.with_descriptor(tag, TypedDescriptor::<V>::new())
    }

    /// Expect a `V` under `tag`, starting at `default`.
    pub fn with_default<V: StateValue>(self, tag: impl Into<Tag>, default: V) -> Self {
        self.with_descriptor(tag, TypedDescriptor::with_default(default))
    }

    pub fn with_descriptor(
        mut self,
        tag: impl Into<Tag>,
        descriptor: impl TypeDescriptor + 'static,
    ) -> Self {
        self.register(tag.into(), Arc::new(descriptor));
        self
    }

    /// Add a descriptor for `tag`. A second descriptor of the same value type
    /// replaces the first.
    pub fn register(&mut self, tag: Tag, descriptor: Arc<dyn TypeDescriptor>) {
        if !tag.is_valid() {
            return;
        }
        let list = self.entries.entry(tag).or_default();
        let value_type = descriptor.expected_value_type();
        match list
            .iter()
            .position(|d| d.expected_value_type() == value_type)
        {
            Some(pos) => list[pos] = descriptor,
            None => list.push(descriptor),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SchemaRegistry for MapSchema {
    fn expected_types(&self, tag: &Tag) -> Vec<Arc<dyn TypeDescriptor>> {
        if let Some(descriptors) = self.entries.get(tag) {
            return descriptors.clone();
        }
        // Ancestors never seen as tags cannot be schema keys.
        tag.ancestor_names()
            .filter_map(Tag::existing)
            .find_map(|ancestor| self.entries.get(&ancestor).cloned())
            .unwrap_or_default()
    }
}

impl fmt::Debug for MapSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (tag, descriptors) in &self.entries {
            let names: Vec<&str> = descriptors
                .iter()
                .map(|d| d.expected_value_type().name())
                .collect();
            map.entry(tag, &names);
        }
        map.finish()
    }
}
