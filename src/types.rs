//! Core types for operations and modification records.

use crate::state::StateParameterSet;
use crate::tag::Tag;
use crate::values::{StateValue, ValueCell};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for an operation, chosen by its producer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// A fresh random id.
    pub fn new() -> Self {
        OperationId(Uuid::new_v4())
    }

    /// The unset id. Operations carrying it are rejected.
    pub fn nil() -> Self {
        OperationId(Uuid::nil())
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to a record when its operation enters the log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a concrete entity instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Who issued an operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSource {
    pub source_type_tag: Tag,
    pub source_entity_id: Option<EntityId>,
    pub source_alias: Option<String>,
    pub parameters: StateParameterSet,
}

/// What an operation changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationModifier {
    pub modifier_tag: Tag,
    pub state_modifications: StateParameterSet,
}

/// Which entities an operation applies to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationTarget {
    pub target_type_tag: Tag,
    pub target_entity_id: Option<EntityId>,
    pub target_alias: Option<String>,
    pub parameters: StateParameterSet,
}

/// A state-change intent: Source, Modifier, Target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: OperationId,
    pub source: OperationSource,
    pub modifier: OperationModifier,
    pub target: OperationTarget,
}

impl Operation {
    /// Create an operation with a fresh id.
    pub fn new(source_type_tag: impl Into<Tag>, target_type_tag: impl Into<Tag>) -> Self {
        Self {
            operation_id: OperationId::new(),
            source: OperationSource {
                source_type_tag: source_type_tag.into(),
                ..Default::default()
            },
            modifier: OperationModifier::default(),
            target: OperationTarget {
                target_type_tag: target_type_tag.into(),
                ..Default::default()
            },
        }
    }

    /// Add one state modification. Invalid tags are ignored with a warning.
    pub fn with_modification<T: StateValue>(mut self, tag: impl Into<Tag>, value: T) -> Self {
        self.modifier
            .state_modifications
            .add_state_param(tag.into(), ValueCell::new(value));
        self
    }

    pub fn with_modification_cell(mut self, tag: impl Into<Tag>, cell: ValueCell) -> Self {
        self.modifier.state_modifications.add_state_param(tag.into(), cell);
        self
    }

    pub fn with_modifications(mut self, modifications: StateParameterSet) -> Self {
        self.modifier.state_modifications = modifications;
        self
    }

    pub fn with_modifier_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.modifier.modifier_tag = tag.into();
        self
    }

    pub fn with_source_entity(mut self, id: EntityId) -> Self {
        self.source.source_entity_id = Some(id);
        self
    }

    pub fn with_source_alias(mut self, alias: impl Into<String>) -> Self {
        self.source.source_alias = Some(alias.into());
        self
    }

    pub fn with_target_entity(mut self, id: EntityId) -> Self {
        self.target.target_entity_id = Some(id);
        self
    }

    pub fn with_target_alias(mut self, alias: impl Into<String>) -> Self {
        self.target.target_alias = Some(alias.into());
        self
    }

    pub fn with_source_param<T: StateValue>(mut self, tag: impl Into<Tag>, value: T) -> Self {
        self.source
            .parameters
            .add_state_param(tag.into(), ValueCell::new(value));
        self
    }

    pub fn with_target_param<T: StateValue>(mut self, tag: impl Into<Tag>, value: T) -> Self {
        self.target
            .parameters
            .add_state_param(tag.into(), ValueCell::new(value));
        self
    }

    pub fn target_type_tag(&self) -> &Tag {
        &self.target.target_type_tag
    }

    pub fn source_type_tag(&self) -> &Tag {
        &self.source.source_type_tag
    }
}

/// An operation as it entered the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateModificationRecord {
    pub record_id: RecordId,
    pub timestamp: Timestamp,
    pub operation: Operation,
}

impl StateModificationRecord {
    pub fn new(operation: Operation) -> Self {
        Self {
            record_id: RecordId::new(),
            timestamp: Timestamp::now(),
            operation,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation.operation_id
    }

    pub fn target_type_tag(&self) -> &Tag {
        &self.operation.target.target_type_tag
    }
}
