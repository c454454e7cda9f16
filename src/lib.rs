//! # Tag State
//!
//! A layered, tag-addressed entity state store driven by an operation log.
//!
//! ## Core Concepts
//!
//! - **Operations**: Source, modifier and target of a state change; each
//!   modifier carries tag-keyed typed values
//! - **Modification log**: Ordered record of applied operations with an
//!   incrementally maintained snapshot per target type
//! - **Subscriptions**: Targeted, non-owning subscribers plus global listeners
//!   and bounded change feeds
//! - **Layered state**: Default, Persistent, Temporary and Override layers
//!   merged into an effective view per entity
//!
//! ## Example
//!
//! ```ignore
//! use tagstate::{Operation, StateManager, StateManagerConfig, Tag};
//!
//! let manager = StateManager::open(StateManagerConfig::default())?;
//!
//! manager.record_operation(
//!     Operation::new("Source.Lever", "Door")
//!         .with_modification("State.Interact.Interactable", true),
//! )?;
//!
//! let door = manager.get_aggregated_modifications(&Tag::new("Door"));
//! assert_eq!(
//!     door.first_value::<bool>(&Tag::new("State.Interact.Interactable")),
//!     Some(&true)
//! );
//! ```

pub mod component;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod records;
pub mod state;
pub mod subscriptions;
pub mod tag;
pub mod types;
pub mod values;

// Re-exports
pub use component::{ComponentConfig, ConnectionState, EntityStateComponent};
pub use error::{Result, StateError};
pub use manager::{StateManager, StateManagerConfig};
pub use persistence::SaveSlot;
pub use records::ModificationLog;
pub use state::{
    LayeredStateContainer, MapSchema, SchemaRegistry, StateCategories, StateLayer, StateObject,
    StateParameterSet, StateParams, TypeDescriptor, TypedDescriptor, TypedState,
};
pub use subscriptions::{ChangeFeed, DropReason, FeedId, ListenerId, LogEvent, SubscriberId};
pub use tag::Tag;
pub use types::*;
pub use values::{
    register_value_type, ItemList, ListValue, Name, Rotator, StateValue, TagValue, Transform,
    ValueCell, ValueKind, ValueType, ValueTypeRegistry, Vector,
};
