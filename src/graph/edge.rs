//! Directed membership edge between a transaction and a category node

use super::node::NodeId;
use serde::{Deserialize, Serialize};

/// Unique identifier for an edge: the concatenation `"<from>-<to>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Derive the edge id from its endpoints
    pub fn between(from: &NodeId, to: &NodeId) -> Self {
        Self(format!("{}-{}", from, to))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge in the graph store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Relation label: the category column the edge was derived from
    pub relationship: String,
}

impl Edge {
    /// Create an edge whose id is derived from its endpoints
    pub fn new(source: NodeId, target: NodeId, relationship: impl Into<String>) -> Self {
        Self {
            id: EdgeId::between(&source, &target),
            source,
            target,
            relationship: relationship.into(),
        }
    }
}
