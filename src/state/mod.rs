//! Per-entity state: parameter sets, state objects, and layered containers.
//!
//! Operations carry [`StateParameterSet`]s. Entities hold live
//! [`StateObject`]s organized into [`StateCategories`], one per
//! [`StateLayer`], whose merged view is the entity's effective state.

mod categories;
mod layered;
mod merge;
mod object;
mod params;
mod schema;

pub use categories::StateCategories;
pub use layered::{LayeredStateContainer, StateLayer};
pub use merge::{aggregate_records, merge_parameter_set, merge_value};
pub use object::{StateObject, TypedState};
pub use params::{StateParameterSet, StateParams};
pub use schema::{MapSchema, SchemaRegistry, TypeDescriptor, TypedDescriptor};
