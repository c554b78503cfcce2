//! Graph mutator: idempotent insertion of a transaction and its categories

use crate::graph::payload::placeholder_payload;
use crate::graph::{Edge, EdgeId, Node, NodeId};
use crate::storage::{GraphStore, StorageResult};

use super::error::InferenceResult;

/// Counts of items a mutation actually created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub nodes_created: usize,
    pub edges_created: usize,
}

/// Writes target and category nodes through one store connection.
///
/// Every write is check-then-insert; an `AlreadyExists` from a racing
/// writer counts as success, so retries and concurrent requests converge
/// on one copy of each node and edge.
pub struct GraphMutator<'a> {
    store: &'a dyn GraphStore,
    embedding_width: usize,
}

/// Turn a duplicate-insert failure into "not created"
fn created(result: StorageResult<()>) -> StorageResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_already_exists() => Ok(false),
        Err(e) => Err(e),
    }
}

impl<'a> GraphMutator<'a> {
    pub fn new(store: &'a dyn GraphStore, embedding_width: usize) -> Self {
        Self {
            store,
            embedding_width,
        }
    }

    fn ensure_node(&self, node: Node) -> StorageResult<bool> {
        if self.store.exists_node(&node.id)? {
            tracing::debug!(node = %node.id, "node exists, skipping insert");
            return Ok(false);
        }
        created(self.store.create_node(&node))
    }

    fn ensure_edge(&self, edge: Edge) -> StorageResult<bool> {
        if self.store.exists_edge(&edge.id)? {
            tracing::debug!(edge = %edge.id, "edge exists, skipping insert");
            return Ok(false);
        }
        created(self.store.create_edge(&edge))
    }

    /// Create the target node with its payload unless it already exists
    pub fn upsert_target(&self, node_id: &NodeId, payload: &str) -> InferenceResult<bool> {
        let inserted = self.ensure_node(Node::new(node_id.clone()).with_payload(payload))?;
        if inserted {
            tracing::info!(node = %node_id, "inserted target node");
        }
        Ok(inserted)
    }

    /// Attach the target to one category node per `(column, value)` pair,
    /// creating missing category nodes with a zero placeholder embedding
    pub fn upsert_category_members(
        &self,
        target_id: &NodeId,
        identity_values: &[(String, String)],
    ) -> InferenceResult<MutationReport> {
        let mut report = MutationReport::default();
        let placeholder = placeholder_payload(self.embedding_width);

        for (column, value) in identity_values {
            let category_id = NodeId::new(column, value);
            let mut category = Node::new(category_id.clone()).with_payload(placeholder.clone());
            category.node_type = column.clone();

            if self.ensure_node(category)? {
                tracing::info!(node = %category_id, "inserted category node");
                report.nodes_created += 1;
            }

            let edge = Edge::new(target_id.clone(), category_id, column.clone());
            let edge_id: EdgeId = edge.id.clone();
            if self.ensure_edge(edge)? {
                tracing::debug!(edge = %edge_id, "inserted membership edge");
                report.edges_created += 1;
            }
        }

        Ok(report)
    }
}
