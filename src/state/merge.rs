//! Merging state modifications into an aggregated snapshot.
//!
//! Per incoming `(tag, cell)`: a cell of the same concrete type already
//! stored under the tag is either extended (list kinds) or overwritten
//! (scalar kinds); otherwise the cell is appended.

use super::params::StateParameterSet;
use crate::tag::Tag;
use crate::types::StateModificationRecord;
use crate::values::{ValueCell, ValueKind};
use tracing::warn;

/// Merge a single value into `snapshot` under `tag`.
pub fn merge_value(snapshot: &mut StateParameterSet, tag: &Tag, incoming: &ValueCell) {
    let Some(value_type) = incoming.value_type() else {
        warn!(tag = %tag, "Skipping empty modification value");
        return;
    };
    if !tag.is_valid() {
        warn!("Skipping modification with invalid tag");
        return;
    }

    let entry = snapshot.entry(tag.clone());
    let Some(existing) = entry.first_of_type_mut(value_type) else {
        entry.values.push(incoming.clone());
        return;
    };

    if value_type.kind() == ValueKind::List {
        let aggregated = match (existing.as_list_mut(), incoming.as_list()) {
            (Some(target), Some(source)) => {
                target.aggregate_items(source.items());
                true
            }
            _ => false,
        };
        if !aggregated {
            warn!(
                tag = %tag,
                value_type = value_type.name(),
                "List-kind value has no list access; overwriting"
            );
            *existing = incoming.clone();
        }
    } else {
        *existing = incoming.clone();
    }
}

/// Merge every modification of `modifications` into `snapshot`, in order.
pub fn merge_parameter_set(snapshot: &mut StateParameterSet, modifications: &StateParameterSet) {
    for params in modifications {
        for cell in &params.values {
            merge_value(snapshot, &params.tag, cell);
        }
    }
}

/// Aggregate the modifications of `records` from an empty snapshot.
pub fn aggregate_records<'a, I>(records: I) -> StateParameterSet
where
    I: IntoIterator<Item = &'a StateModificationRecord>,
{
    let mut snapshot = StateParameterSet::new();
    for record in records {
        merge_parameter_set(&mut snapshot, &record.operation.modifier.state_modifications);
    }
    snapshot
}
