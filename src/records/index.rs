//! Secondary indexes over the modification log.

use crate::tag::Tag;
use crate::types::OperationId;
use std::collections::HashMap;

/// Operation id to log position.
#[derive(Debug, Default)]
pub struct OperationIdIndex {
    positions: HashMap<OperationId, usize>,
}

impl OperationIdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: OperationId, position: usize) {
        self.positions.insert(id, position);
    }

    pub fn get(&self, id: &OperationId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn remove(&mut self, id: &OperationId) -> Option<usize> {
        self.positions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Target type tag to the log positions of its records.
#[derive(Debug, Default)]
pub struct TargetTypeIndex {
    positions: HashMap<Tag, Vec<usize>>,
}

impl TargetTypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: Tag, position: usize) {
        self.positions.entry(target).or_default().push(position);
    }

    /// Positions for `target`, or an empty slice.
    pub fn get(&self, target: &Tag) -> &[usize] {
        self.positions
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drop `position` from `target`'s list, removing the entry when empty.
    pub fn remove(&mut self, target: &Tag, position: usize) -> bool {
        let Some(list) = self.positions.get_mut(target) else {
            return false;
        };
        let Some(i) = list.iter().position(|&p| p == position) else {
            return false;
        };
        list.swap_remove(i);
        if list.is_empty() {
            self.positions.remove(target);
        }
        true
    }

    /// Rewrite `from` to `to` in `target`'s list.
    pub fn relocate(&mut self, target: &Tag, from: usize, to: usize) -> bool {
        match self
            .positions
            .get_mut(target)
            .and_then(|list| list.iter_mut().find(|p| **p == from))
        {
            Some(slot) => {
                *slot = to;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, target: &Tag) -> bool {
        self.positions.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Tag> {
        self.positions.keys()
    }

    /// Number of target types with at least one record.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
