//! Tag-keyed collections of live state objects.

use super::object::{StateObject, TypedState};
use super::params::{StateParameterSet, StateParams};
use super::schema::SchemaRegistry;
use crate::tag::Tag;
use crate::values::{StateValue, ValueCell, ValueType};
use indexmap::IndexMap;
use tracing::{debug, trace};

type Objects = Vec<Box<dyn StateObject>>;

/// `Tag -> [state objects]`, at most one object per (tag, value type).
///
/// Categories keep the order in which their tags were first added. A tag
/// may map to no objects: the category exists but none of its facets is set.
#[derive(Clone, Debug, Default)]
pub struct StateCategories {
    categories: IndexMap<Tag, Objects>,
}

impl StateCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch: for every valid tag in `init`, create one object
    /// per schema-expected type, initialized from the first matching value in
    /// `init` or left at the type's default.
    pub fn apply_init_data(&mut self, init: &StateParameterSet, schema: &dyn SchemaRegistry) {
        self.categories.clear();

        for params in init {
            if !params.tag.is_valid() {
                continue;
            }
            let descriptors = schema.expected_types(&params.tag);
            if descriptors.is_empty() {
                debug!(tag = %params.tag, "No schema types for tag; category left empty");
            }

            let mut objects: Objects = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                let value_type = descriptor.expected_value_type();
                if objects.iter().any(|o| o.value_type() == value_type) {
                    continue;
                }
                let mut object = descriptor.create_state_object(&params.tag);
                if let Some(cell) = params.first_of_type(value_type) {
                    object.apply_value(cell);
                }
                objects.push(object);
            }

            self.categories.insert(params.tag.clone(), objects);
        }
    }

    /// Reconcile with `params`.
    ///
    /// Tags absent from `params` are removed. For each present tag, every
    /// schema-expected type with an incoming value keeps its existing object
    /// (updated in place) or gets a new one; expected types without an
    /// incoming value are dropped. A present tag with no matching value
    /// stays as an empty category.
    pub fn update_from_parameter_map(
        &mut self,
        params: &StateParameterSet,
        schema: &dyn SchemaRegistry,
    ) {
        let mut previous = std::mem::take(&mut self.categories);

        for incoming in params {
            if !incoming.tag.is_valid() {
                continue;
            }

            let mut existing = previous.swap_remove(&incoming.tag).unwrap_or_default();

            let mut objects: Objects = Vec::new();
            for descriptor in schema.expected_types(&incoming.tag) {
                let value_type = descriptor.expected_value_type();
                if objects.iter().any(|o| o.value_type() == value_type) {
                    continue;
                }
                let Some(cell) = incoming.first_of_type(value_type) else {
                    continue;
                };

                let mut object = match existing.iter().position(|o| o.value_type() == value_type) {
                    Some(pos) => existing.swap_remove(pos),
                    None => descriptor.create_state_object(&incoming.tag),
                };
                object.apply_value(cell);
                objects.push(object);
            }

            if objects.is_empty() {
                trace!(tag = %incoming.tag, "No matching values for tag after reconcile");
            }
            self.categories.insert(incoming.tag.clone(), objects);
        }
    }

    /// Replace each of this container's tag entries with `other`'s wholesale.
    ///
    /// An empty entry in `other` still replaces, hiding this container's
    /// objects for that tag.
    pub fn merge_with(&mut self, other: &StateCategories) {
        for (tag, objects) in &other.categories {
            self.categories.insert(tag.clone(), objects.clone());
        }
    }

    /// Add an object, replacing any existing object of the same value type
    /// under the same tag.
    pub fn add_state_object(&mut self, object: Box<dyn StateObject>) -> bool {
        let tag = object.tag().clone();
        if !tag.is_valid() {
            return false;
        }
        let value_type = object.value_type();
        let objects = self.categories.entry(tag).or_default();
        match objects.iter().position(|o| o.value_type() == value_type) {
            Some(existing) => objects[existing] = object,
            None => objects.push(object),
        }
        true
    }

    /// Convenience for adding a [`TypedState`].
    pub fn set_value<V: StateValue>(&mut self, tag: impl Into<Tag>, value: V) -> bool {
        self.add_state_object(Box::new(TypedState::new(tag.into(), value)))
    }

    /// Remove the object of `value_type` under `tag`, dropping the tag if it
    /// becomes empty.
    pub fn remove_state_object(&mut self, tag: &Tag, value_type: ValueType) -> bool {
        let Some(objects) = self.categories.get_mut(tag) else {
            return false;
        };
        let before = objects.len();
        objects.retain(|o| o.value_type() != value_type);
        let removed = objects.len() != before;
        if objects.is_empty() {
            self.categories.shift_remove(tag);
        }
        removed
    }

    pub fn clear_tag(&mut self, tag: &Tag) -> bool {
        self.categories.shift_remove(tag).is_some()
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }

    /// First object of concrete type `S` under `tag`.
    pub fn find_first<S: StateObject + 'static>(&self, tag: &Tag) -> Option<&S> {
        self.objects(tag)
            .iter()
            .find_map(|o| o.as_any().downcast_ref::<S>())
    }

    pub fn find_first_mut<S: StateObject + 'static>(&mut self, tag: &Tag) -> Option<&mut S> {
        self.categories
            .get_mut(tag)?
            .iter_mut()
            .find_map(|o| o.as_any_mut().downcast_mut::<S>())
    }

    /// Every object of concrete type `S` under `tag`.
    pub fn get_all<S: StateObject + 'static>(&self, tag: &Tag) -> Vec<&S> {
        self.objects(tag)
            .iter()
            .filter_map(|o| o.as_any().downcast_ref::<S>())
            .collect()
    }

    /// The value of the [`TypedState<V>`] under `tag`.
    pub fn find_first_value<V: StateValue>(&self, tag: &Tag) -> Option<&V> {
        self.find_first::<TypedState<V>>(tag).map(TypedState::get)
    }

    /// The first object's value under `tag`.
    pub fn first_cell(&self, tag: &Tag) -> Option<ValueCell> {
        self.objects(tag).first().map(|o| o.current_value())
    }

    /// All objects under `tag`, or an empty slice.
    pub fn objects(&self, tag: &Tag) -> &[Box<dyn StateObject>] {
        self.categories
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.categories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.categories.keys()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Current values as a parameter set, one cell per object. Empty
    /// categories have no values and are left out.
    pub fn to_parameter_set(&self) -> StateParameterSet {
        let mut set = StateParameterSet::new();
        for (tag, objects) in &self.categories {
            if objects.is_empty() {
                continue;
            }
            let mut params = StateParams::new(tag.clone());
            params.values = objects.iter().map(|o| o.current_value()).collect();
            set.set_params(params);
        }
        set
    }
}
