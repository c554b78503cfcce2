//! Core graph data structures

mod edge;
mod node;
pub mod payload;

pub use edge::{Edge, EdgeId};
pub use node::{LocalId, Node, NodeId, Properties, PropertyValue, PAYLOAD_KEY, TARGET_TYPE};
