//! Priority-layered state with a lazily merged effective view.

use super::categories::StateCategories;
use super::object::StateObject;
use super::params::StateParameterSet;
use super::schema::SchemaRegistry;
use crate::tag::Tag;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// State layers, lowest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateLayer {
    /// Initial values from entity configuration.
    Default,
    /// Values synchronized from the operation log.
    Persistent,
    /// Short-lived local changes.
    Temporary,
    /// Forced values that beat everything else.
    Override,
}

impl StateLayer {
    /// All layers in merge order.
    pub const ALL: [StateLayer; 4] = [
        StateLayer::Default,
        StateLayer::Persistent,
        StateLayer::Temporary,
        StateLayer::Override,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StateLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateLayer::Default => "default",
            StateLayer::Persistent => "persistent",
            StateLayer::Temporary => "temporary",
            StateLayer::Override => "override",
        };
        write!(f, "{}", name)
    }
}

/// Four [`StateCategories`] merged by priority.
///
/// Every mutation bumps `version`. The effective view is rebuilt on demand
/// when its cached version is stale.
pub struct LayeredStateContainer {
    schema: Arc<dyn SchemaRegistry>,
    layers: [StateCategories; 4],
    version: u64,
    effective: StateCategories,
    effective_version: Option<u64>,
}

impl LayeredStateContainer {
    pub fn new(schema: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            schema,
            layers: Default::default(),
            version: 0,
            effective: StateCategories::new(),
            effective_version: None,
        }
    }

    pub fn schema(&self) -> &Arc<dyn SchemaRegistry> {
        &self.schema
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn layer(&self, layer: StateLayer) -> &StateCategories {
        &self.layers[layer.index()]
    }

    /// Replace a layer's contents.
    pub fn set_layer(&mut self, layer: StateLayer, categories: StateCategories) {
        self.layers[layer.index()] = categories;
        self.bump();
    }

    pub fn clear_layer(&mut self, layer: StateLayer) {
        self.layers[layer.index()].clear();
        self.bump();
    }

    pub fn clear_all_layers(&mut self) {
        for layer in &mut self.layers {
            layer.clear();
        }
        self.bump();
    }

    /// Reconcile a layer with `params` (see
    /// [`StateCategories::update_from_parameter_map`]).
    pub fn apply_parameter_set_to_layer(&mut self, layer: StateLayer, params: &StateParameterSet) {
        let schema = self.schema.clone();
        self.layers[layer.index()].update_from_parameter_map(params, schema.as_ref());
        self.bump();
    }

    /// Rebuild a layer from `init` (see [`StateCategories::apply_init_data`]).
    pub fn apply_init_data_to_layer(&mut self, layer: StateLayer, init: &StateParameterSet) {
        let schema = self.schema.clone();
        self.layers[layer.index()].apply_init_data(init, schema.as_ref());
        self.bump();
    }

    /// Mutate a layer in place.
    pub fn modify_layer<R>(
        &mut self,
        layer: StateLayer,
        f: impl FnOnce(&mut StateCategories) -> R,
    ) -> R {
        let result = f(&mut self.layers[layer.index()]);
        self.bump();
        result
    }

    pub fn has_data_in_layer(&self, layer: StateLayer) -> bool {
        !self.layers[layer.index()].is_empty()
    }

    pub fn find_in_layer<S: StateObject + 'static>(&self, layer: StateLayer, tag: &Tag) -> Option<&S> {
        self.layers[layer.index()].find_first::<S>(tag)
    }

    /// All layers merged Default -> Override, tag by tag.
    pub fn effective_state(&mut self) -> &StateCategories {
        if self.effective_version != Some(self.version) {
            let mut merged = StateCategories::new();
            for layer in &self.layers {
                merged.merge_with(layer);
            }
            self.effective = merged;
            self.effective_version = Some(self.version);
            trace!(version = self.version, "Rebuilt effective state");
        }
        &self.effective
    }

    /// True if the effective view is up to date with the layers.
    pub fn is_effective_cached(&self) -> bool {
        self.effective_version == Some(self.version)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

impl fmt::Debug for LayeredStateContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredStateContainer")
            .field("version", &self.version)
            .field("default", &self.layers[0].len())
            .field("persistent", &self.layers[1].len())
            .field("temporary", &self.layers[2].len())
            .field("override", &self.layers[3].len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::schema::MapSchema;
    use crate::state::TypedState;

    fn container() -> LayeredStateContainer {
        LayeredStateContainer::new(Arc::new(
            MapSchema::new().with_type::<i64>("X").with_type::<bool>("Y"),
        ))
    }

    fn x(v: i64) -> StateParameterSet {
        StateParameterSet::new().with_value("X", v)
    }

    fn effective_x(c: &mut LayeredStateContainer) -> Option<i64> {
        c.effective_state().find_first_value::<i64>(&Tag::new("X")).copied()
    }

    #[test]
    fn test_layer_priority() {
        let mut c = container();
        c.apply_parameter_set_to_layer(StateLayer::Default, &x(1));
        c.apply_parameter_set_to_layer(StateLayer::Persistent, &x(2));
        assert_eq!(effective_x(&mut c), Some(2));

        c.apply_parameter_set_to_layer(StateLayer::Override, &x(3));
        assert_eq!(effective_x(&mut c), Some(3));

        c.clear_layer(StateLayer::Override);
        assert_eq!(effective_x(&mut c), Some(2));

        c.apply_parameter_set_to_layer(StateLayer::Temporary, &x(4));
        assert_eq!(effective_x(&mut c), Some(4));
    }

    #[test]
    fn test_lower_layers_fill_gaps() {
        let mut c = container();
        c.apply_init_data_to_layer(
            StateLayer::Default,
            &StateParameterSet::new().with_value("X", 1i64).with_value("Y", true),
        );
        c.apply_parameter_set_to_layer(StateLayer::Override, &x(9));
        let state = c.effective_state();
        assert_eq!(state.find_first_value::<i64>(&Tag::new("X")), Some(&9));
        assert_eq!(state.find_first_value::<bool>(&Tag::new("Y")), Some(&true));
    }

    #[test]
    fn test_unset_facet_in_higher_layer_hides_default() {
        let mut c = container();
        c.apply_init_data_to_layer(StateLayer::Default, &x(1));
        assert_eq!(effective_x(&mut c), Some(1));

        // X only expects an int; a bool for it leaves the category empty.
        c.apply_parameter_set_to_layer(
            StateLayer::Persistent,
            &StateParameterSet::new().with_value("X", true),
        );
        assert!(c.layer(StateLayer::Persistent).contains(&Tag::new("X")));

        let state = c.effective_state();
        assert!(state.contains(&Tag::new("X")));
        assert!(state.objects(&Tag::new("X")).is_empty());
        assert_eq!(effective_x(&mut c), None);

        c.clear_layer(StateLayer::Persistent);
        assert_eq!(effective_x(&mut c), Some(1));
    }

    #[test]
    fn test_version_and_cache() {
        let mut c = container();
        assert_eq!(c.version(), 0);
        assert!(!c.is_effective_cached());

        c.effective_state();
        assert!(c.is_effective_cached());

        c.set_layer(StateLayer::Temporary, StateCategories::new());
        assert_eq!(c.version(), 1);
        assert!(!c.is_effective_cached());

        c.apply_parameter_set_to_layer(StateLayer::Persistent, &x(5));
        c.clear_all_layers();
        assert_eq!(c.version(), 3);
        assert!(c.effective_state().is_empty());
    }

    #[test]
    fn test_layer_inspection() {
        let mut c = container();
        assert!(!c.has_data_in_layer(StateLayer::Persistent));
        c.apply_parameter_set_to_layer(StateLayer::Persistent, &x(2));
        assert!(c.has_data_in_layer(StateLayer::Persistent));
        assert!(!c.has_data_in_layer(StateLayer::Default));

        let found = c.find_in_layer::<TypedState<i64>>(StateLayer::Persistent, &Tag::new("X"));
        assert_eq!(found.map(|s| *s.get()), Some(2));
        assert!(c
            .find_in_layer::<TypedState<i64>>(StateLayer::Default, &Tag::new("X"))
            .is_none());
    }

    #[test]
    fn test_modify_layer_bumps_version() {
        let mut c = container();
        let added = c.modify_layer(StateLayer::Temporary, |layer| layer.set_value("X", 7i64));
        assert!(added);
        assert_eq!(c.version(), 1);
        assert_eq!(effective_x(&mut c), Some(7));
    }
}
