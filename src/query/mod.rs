//! Traversal over the transaction graph
//!
//! Traversals are expressed as `TraversalPlan` values and interpreted
//! against any `GraphStore`.

mod plan;
mod types;

pub use plan::{Step, TraversalBudget, TraversalError, TraversalPlan};
pub use types::Direction;
