//! Ordered tag-to-values parameter sets.

use crate::tag::Tag;
use crate::values::{StateValue, ValueCell, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The values carried for one tag. Order matters for list aggregation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateParams {
    pub tag: Tag,
    pub values: Vec<ValueCell>,
}

impl StateParams {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            values: Vec::new(),
        }
    }

    /// First value of type `T`.
    pub fn first<T: StateValue>(&self) -> Option<&T> {
        self.values.iter().find_map(|cell| cell.get::<T>())
    }

    /// First cell holding a value of `value_type`.
    pub fn first_of_type(&self, value_type: ValueType) -> Option<&ValueCell> {
        self.values
            .iter()
            .find(|cell| cell.value_type() == Some(value_type))
    }

    pub fn first_of_type_mut(&mut self, value_type: ValueType) -> Option<&mut ValueCell> {
        self.values
            .iter_mut()
            .find(|cell| cell.value_type() == Some(value_type))
    }
}

/// Ordered map from tag to the values recorded for it. Each tag appears once.
///
/// Serialized as a tag-keyed map. Entries are re-keyed by their own tag on
/// the way in, so invalid tags in external data are dropped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "IndexMap<Tag, StateParams>",
    from = "IndexMap<Tag, StateParams>"
)]
pub struct StateParameterSet {
    params: IndexMap<Tag, StateParams>,
}

impl StateParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `tag`, creating the entry if needed.
    ///
    /// Returns false (and logs) for an invalid tag or an empty cell.
    pub fn add_state_param(&mut self, tag: Tag, value: ValueCell) -> bool {
        if !tag.is_valid() {
            warn!("Rejected state param with invalid tag");
            return false;
        }
        if !value.is_valid() {
            warn!(tag = %tag, "Rejected empty state param value");
            return false;
        }
        self.entry(tag).values.push(value);
        true
    }

    /// Typed shorthand for [`StateParameterSet::add_state_param`].
    pub fn add_value<T: StateValue>(&mut self, tag: impl Into<Tag>, value: T) -> bool {
        self.add_state_param(tag.into(), ValueCell::new(value))
    }

    /// Builder form of [`StateParameterSet::add_value`].
    pub fn with_value<T: StateValue>(mut self, tag: impl Into<Tag>, value: T) -> Self {
        self.add_value(tag, value);
        self
    }

    /// Replace every value for `params.tag`.
    pub fn set_params(&mut self, params: StateParams) -> bool {
        if !params.tag.is_valid() {
            warn!("Rejected state params with invalid tag");
            return false;
        }
        self.params.insert(params.tag.clone(), params);
        true
    }

    /// The entry for `tag`, created empty if absent. The tag must be valid.
    pub(crate) fn entry(&mut self, tag: Tag) -> &mut StateParams {
        self.params
            .entry(tag.clone())
            .or_insert_with(|| StateParams::new(tag))
    }

    pub fn get(&self, tag: &Tag) -> Option<&StateParams> {
        self.params.get(tag)
    }

    pub fn get_mut(&mut self, tag: &Tag) -> Option<&mut StateParams> {
        self.params.get_mut(tag)
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.params.contains_key(tag)
    }

    /// First value of type `T` under `tag`.
    pub fn first_value<T: StateValue>(&self, tag: &Tag) -> Option<&T> {
        self.get(tag)?.first::<T>()
    }

    /// All values under `tag`, or an empty slice.
    pub fn values(&self, tag: &Tag) -> &[ValueCell] {
        self.get(tag).map(|p| p.values.as_slice()).unwrap_or(&[])
    }

    pub fn remove(&mut self, tag: &Tag) -> Option<StateParams> {
        self.params.shift_remove(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateParams> {
        self.params.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.params.keys()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// JSON rendering, for inspection and export.
    pub fn to_json(&self) -> crate::error::Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for params in self.params.values() {
            let values = params
                .values
                .iter()
                .map(ValueCell::to_json)
                .collect::<crate::error::Result<Vec<_>>>()?;
            map.insert(params.tag.to_string(), serde_json::Value::Array(values));
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl<'a> IntoIterator for &'a StateParameterSet {
    type Item = &'a StateParams;
    type IntoIter = indexmap::map::Values<'a, Tag, StateParams>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.values()
    }
}

impl From<IndexMap<Tag, StateParams>> for StateParameterSet {
    fn from(map: IndexMap<Tag, StateParams>) -> Self {
        let mut set = StateParameterSet::new();
        for params in map.into_values() {
            set.set_params(params);
        }
        set
    }
}

impl From<StateParameterSet> for IndexMap<Tag, StateParams> {
    fn from(set: StateParameterSet) -> Self {
        set.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_appends_to_existing_tag() {
        let mut set = StateParameterSet::new();
        assert!(set.add_value("State.Open", true));
        assert!(set.add_value("State.Open", 2i64));
        assert!(set.add_value("State.Lock", false));

        assert_eq!(set.len(), 2);
        let open = set.get(&Tag::new("State.Open")).unwrap();
        assert_eq!(open.values.len(), 2);
        assert_eq!(open.first::<i64>(), Some(&2));
    }

    #[test]
    fn test_rejects_invalid_input() {
        let mut set = StateParameterSet::new();
        assert!(!set.add_state_param(Tag::none(), ValueCell::new(true)));
        assert!(!set.add_state_param(Tag::new("State.Open"), ValueCell::empty()));
        assert!(!set.set_params(StateParams::new(Tag::none())));
        assert!(set.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let set = StateParameterSet::new()
            .with_value("C", 1i64)
            .with_value("A", 2i64)
            .with_value("B", 3i64);
        let tags: Vec<&str> = set.tags().map(Tag::as_str).collect();
        assert_eq!(tags, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_set_params_replaces() {
        let mut set = StateParameterSet::new().with_value("A", 1i64).with_value("A", 2i64);
        let mut params = StateParams::new(Tag::new("A"));
        params.values.push(ValueCell::new(9i64));
        set.set_params(params);
        assert_eq!(set.values(&Tag::new("A")).len(), 1);
        assert_eq!(set.first_value::<i64>(&Tag::new("A")), Some(&9));
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut set = StateParameterSet::new().with_value("A", true);
        assert!(set.contains(&Tag::new("A")));
        assert!(set.remove(&Tag::new("A")).is_some());
        assert!(set.remove(&Tag::new("A")).is_none());
        assert!(set.values(&Tag::new("A")).is_empty());
    }

    #[test]
    fn test_remove_keeps_order_of_remaining_tags() {
        let mut set = StateParameterSet::new()
            .with_value("A", 1i64)
            .with_value("B", 2i64)
            .with_value("C", 3i64);
        set.remove(&Tag::new("A"));
        let tags: Vec<&str> = set.tags().map(Tag::as_str).collect();
        assert_eq!(tags, vec!["B", "C"]);
    }

    #[test]
    fn test_serde_rekeys_by_entry_tag() {
        let set = StateParameterSet::new()
            .with_value("State.Open", true)
            .with_value("Stats.Health", 3i64);
        let json = serde_json::to_string(&set).unwrap();
        let back: StateParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        let mut params = StateParams::new(Tag::new("Real"));
        params.values.push(ValueCell::new(1i64));
        let mut map = IndexMap::new();
        map.insert(Tag::new("Wrong"), params);
        map.insert(Tag::new("Empty"), StateParams::new(Tag::none()));
        let set = StateParameterSet::from(map);
        assert_eq!(set.tags().map(Tag::as_str).collect::<Vec<_>>(), vec!["Real"]);
    }

    #[test]
    fn test_to_json() {
        let set = StateParameterSet::new().with_value("State.Open", true);
        let json = set.to_json().unwrap();
        assert_eq!(json["State.Open"][0]["value"], true);
    }
}
