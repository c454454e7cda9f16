//! List-capable values.

use super::cell::{StateValue, ValueCell, ValueKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A value that accumulates items when merged instead of being overwritten.
pub trait ListValue: Send + Sync {
    fn items(&self) -> &[ValueCell];

    fn items_mut(&mut self) -> &mut Vec<ValueCell>;

    /// Whether `item` may be stored in this list. Defaults to any valid cell.
    fn accepts_item(&self, item: &ValueCell) -> bool {
        item.is_valid()
    }

    /// Append every acceptable item of `incoming`, in order.
    ///
    /// Invalid or rejected items are dropped with a warning. Returns the
    /// number of items appended.
    fn aggregate_items(&mut self, incoming: &[ValueCell]) -> usize {
        let mut appended = 0;
        for item in incoming {
            if !item.is_valid() {
                warn!("Dropping empty item during list aggregation");
                continue;
            }
            if !self.accepts_item(item) {
                warn!(
                    item_type = item.type_name().unwrap_or("<none>"),
                    "List rejected item of disallowed type"
                );
                continue;
            }
            self.items_mut().push(item.clone());
            appended += 1;
        }
        appended
    }
}

/// General-purpose list with an optional allow-list of item types.
///
/// An empty allow-list accepts any valid item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    items: Vec<ValueCell>,
    allowed: Vec<String>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict items to the value type `T` (may be called repeatedly).
    pub fn allow<T: StateValue>(mut self) -> Self {
        self.allowed.push(T::TYPE_NAME.to_string());
        self
    }

    /// Builder form of [`ItemList::push`].
    pub fn with_item<T: StateValue>(mut self, value: T) -> Self {
        self.push(ValueCell::new(value));
        self
    }

    /// Append one item if accepted.
    pub fn push(&mut self, item: ValueCell) -> bool {
        if self.accepts_item(&item) {
            self.items.push(item);
            true
        } else {
            warn!(
                item_type = item.type_name().unwrap_or("<none>"),
                "List rejected item of disallowed type"
            );
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed
    }

    /// Items that hold a `T`, in order.
    pub fn values<T: StateValue>(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| item.get::<T>())
    }
}

impl ListValue for ItemList {
    fn items(&self) -> &[ValueCell] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Vec<ValueCell> {
        &mut self.items
    }

    fn accepts_item(&self, item: &ValueCell) -> bool {
        match item.type_name() {
            Some(name) => self.allowed.is_empty() || self.allowed.iter().any(|a| a == name),
            None => false,
        }
    }
}

impl StateValue for ItemList {
    const TYPE_NAME: &'static str = "ItemList";
    const KIND: ValueKind = ValueKind::List;

    fn as_list(&self) -> Option<&dyn ListValue> {
        Some(self)
    }

    fn as_list_mut(&mut self) -> Option<&mut dyn ListValue> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_appends_in_order() {
        let mut list = ItemList::new().with_item(1i64);
        let appended = list.aggregate_items(&[ValueCell::new(2i64), ValueCell::new(3i64)]);
        assert_eq!(appended, 2);
        let values: Vec<i64> = list.values::<i64>().copied().collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_aggregate_drops_invalid_items() {
        let mut list = ItemList::new();
        let appended = list.aggregate_items(&[
            ValueCell::empty(),
            ValueCell::new(true),
            ValueCell::empty(),
        ]);
        assert_eq!(appended, 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_allow_list_filters() {
        let mut list = ItemList::new().allow::<String>();
        assert!(list.push(ValueCell::new(String::from("open"))));
        assert!(!list.push(ValueCell::new(5i64)));

        let appended = list.aggregate_items(&[
            ValueCell::new(1.5f64),
            ValueCell::new(String::from("close")),
        ]);
        assert_eq!(appended, 1);
        let names: Vec<&String> = list.values::<String>().collect();
        assert_eq!(names, vec!["open", "close"]);
    }
}
