//! The modification log and its per-target aggregated snapshots.
//!
//! Records live in a `Vec` addressed by position. Unloading uses swap-remove,
//! so positions do not reflect recording order; every entry also carries a
//! monotonically increasing sequence number that does.

use super::index::{OperationIdIndex, TargetTypeIndex};
use crate::error::{Result, StateError};
use crate::state::{aggregate_records, merge_parameter_set, StateParameterSet};
use crate::tag::Tag;
use crate::types::{Operation, OperationId, StateModificationRecord};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct LogEntry {
    sequence: u64,
    record: StateModificationRecord,
}

/// Append-only (until unloaded) log of modification records.
///
/// Keeps an aggregated snapshot per target type that always equals replaying
/// that target's surviving records, in recording order, through the merge
/// rule.
#[derive(Debug, Default)]
pub struct ModificationLog {
    entries: Vec<LogEntry>,
    by_operation: OperationIdIndex,
    by_target: TargetTypeIndex,
    aggregated: HashMap<Tag, StateParameterSet>,
    next_sequence: u64,
}

impl ModificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `operation` can be recorded.
    pub fn validate(&self, operation: &Operation) -> Result<()> {
        if !operation.operation_id.is_valid() {
            return Err(StateError::InvalidOperation("operation id is not set".into()));
        }
        if !operation.target.target_type_tag.is_valid() {
            return Err(StateError::InvalidOperation(format!(
                "operation {} has no valid target type tag",
                operation.operation_id
            )));
        }
        if self.by_operation.contains(&operation.operation_id) {
            return Err(StateError::DuplicateOperation(operation.operation_id));
        }
        Ok(())
    }

    // --- Recording ---

    /// Validate and append `operation`, returning a copy of the new record.
    ///
    /// Nothing changes if validation fails.
    pub fn record(&mut self, operation: Operation) -> Result<StateModificationRecord> {
        self.validate(&operation)?;
        let record = StateModificationRecord::new(operation);
        self.insert(record.clone());
        Ok(record)
    }

    /// Append an existing record (e.g. one restored from a save slot).
    pub fn append_record(&mut self, record: StateModificationRecord) -> Result<()> {
        self.validate(&record.operation)?;
        self.insert(record);
        Ok(())
    }

    fn insert(&mut self, record: StateModificationRecord) {
        let position = self.entries.len();
        let target = record.target_type_tag().clone();

        self.by_operation.insert(record.operation_id(), position);
        self.by_target.add(target.clone(), position);

        // Incremental: fold only this record into its target's snapshot.
        let snapshot = self.aggregated.entry(target.clone()).or_default();
        merge_parameter_set(snapshot, &record.operation.modifier.state_modifications);

        trace!(
            operation = %record.operation_id(),
            target = %target,
            position,
            "Recorded operation"
        );

        self.entries.push(LogEntry {
            sequence: self.next_sequence,
            record,
        });
        self.next_sequence += 1;
    }

    // --- Unloading ---

    /// Remove the record for `id` and recompute its target's snapshot.
    pub fn unload(&mut self, id: &OperationId) -> Option<StateModificationRecord> {
        let Some(position) = self.by_operation.get(id) else {
            debug!(operation = %id, "Unload: operation not in log");
            return None;
        };

        let removed = self.entries.swap_remove(position);
        let target = removed.record.target_type_tag().clone();
        self.by_operation.remove(id);
        self.by_target.remove(&target, position);

        // The former last entry now sits at `position`.
        if position < self.entries.len() {
            let old_position = self.entries.len();
            let moved = &self.entries[position].record;
            self.by_operation.insert(moved.operation_id(), position);
            self.by_target
                .relocate(moved.target_type_tag(), old_position, position);
        }

        self.recompute_target(&target);
        trace!(operation = %id, target = %target, "Unloaded operation");
        Some(removed.record)
    }

    /// Remove every record whose source type tag equals `source`.
    ///
    /// Only the snapshots of affected target types are recomputed. Returns
    /// the removed records in recording order.
    pub fn unload_by_source(&mut self, source: &Tag) -> Vec<StateModificationRecord> {
        let mut removed: Vec<LogEntry> = Vec::new();
        let mut affected: Vec<Tag> = Vec::new();
        let mut kept: Vec<LogEntry> = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            if entry.record.operation.source_type_tag() == source {
                let target = entry.record.target_type_tag();
                if !affected.contains(target) {
                    affected.push(target.clone());
                }
                removed.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;

        if removed.is_empty() {
            return Vec::new();
        }

        self.rebuild_indexes();
        for target in &affected {
            self.recompute_target(target);
        }

        removed.sort_by_key(|e| e.sequence);
        removed.into_iter().map(|e| e.record).collect()
    }

    /// Drop every record and snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_operation.clear();
        self.by_target.clear();
        self.aggregated.clear();
    }

    /// Replace the log with `records`, rebuilding indexes and snapshots.
    ///
    /// Records that fail validation (including duplicates) are skipped.
    /// Returns the number of records kept.
    pub fn replace_all(&mut self, records: Vec<StateModificationRecord>) -> usize {
        self.clear();
        for record in records {
            let id = record.operation_id();
            if let Err(e) = self.append_record(record) {
                warn!(operation = %id, error = %e, "Skipping unloadable record");
            }
        }
        self.entries.len()
    }

    // --- Queries ---

    /// The aggregated snapshot for `target`.
    ///
    /// A valid tag is a cache lookup. An invalid tag aggregates the entire
    /// log on the fly; that path is slow and meant for global inspection.
    pub fn aggregated(&self, target: &Tag) -> StateParameterSet {
        if target.is_valid() {
            return self.aggregated.get(target).cloned().unwrap_or_default();
        }
        let positions = self.ordered_positions(0..self.entries.len());
        aggregate_records(positions.into_iter().map(|p| &self.entries[p].record))
    }

    /// Replay `target`'s records from scratch without consulting the cache.
    pub fn replay_target(&self, target: &Tag) -> StateParameterSet {
        let positions = self.ordered_positions(self.by_target.get(target).iter().copied());
        aggregate_records(positions.into_iter().map(|p| &self.entries[p].record))
    }

    pub fn find(&self, id: &OperationId) -> Option<&StateModificationRecord> {
        self.by_operation
            .get(id)
            .map(|position| &self.entries[position].record)
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.by_operation.contains(id)
    }

    /// Copies of all records in recording order.
    pub fn records(&self) -> Vec<StateModificationRecord> {
        self.ordered_positions(0..self.entries.len())
            .into_iter()
            .map(|p| self.entries[p].record.clone())
            .collect()
    }

    /// Copies of `target`'s records in recording order.
    pub fn records_for_target(&self, target: &Tag) -> Vec<StateModificationRecord> {
        self.ordered_positions(self.by_target.get(target).iter().copied())
            .into_iter()
            .map(|p| self.entries[p].record.clone())
            .collect()
    }

    /// The most recently recorded record for `target`.
    pub fn latest_for_target(&self, target: &Tag) -> Option<&StateModificationRecord> {
        self.by_target
            .get(target)
            .iter()
            .max_by_key(|&&p| self.entries[p].sequence)
            .map(|&p| &self.entries[p].record)
    }

    /// Target types that currently have records.
    pub fn target_types(&self) -> Vec<Tag> {
        self.by_target.targets().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // --- Internal ---

    fn ordered_positions(&self, positions: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut positions: Vec<usize> = positions.into_iter().collect();
        positions.sort_by_key(|&p| self.entries[p].sequence);
        positions
    }

    fn recompute_target(&mut self, target: &Tag) {
        if !self.by_target.contains(target) {
            self.aggregated.remove(target);
            return;
        }
        let snapshot = self.replay_target(target);
        self.aggregated.insert(target.clone(), snapshot);
    }

    fn rebuild_indexes(&mut self) {
        self.by_operation.clear();
        self.by_target.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            self.by_operation
                .insert(entry.record.operation_id(), position);
            self.by_target
                .add(entry.record.target_type_tag().clone(), position);
        }
    }
}
