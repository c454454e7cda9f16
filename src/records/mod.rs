//! Modification log implementation.
//!
//! Records are kept in a positional log with an operation-id index for O(1)
//! unload and a target-type index that scopes snapshot recomputation.

mod index;
mod log;

pub use index::{OperationIdIndex, TargetTypeIndex};
pub use log::ModificationLog;
