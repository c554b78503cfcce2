//! In-process graph store backed by concurrent maps

use super::traits::{GraphStore, StorageError, StorageResult, StoreConnector};
use crate::graph::{Edge, EdgeId, Node, NodeId};
use crate::query::Direction;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    nodes: DashMap<NodeId, Node>,
    edges: DashMap<EdgeId, Edge>,
    /// Outgoing neighbors per node, in edge insertion order
    outgoing: DashMap<NodeId, Vec<NodeId>>,
    /// Incoming neighbors per node, in edge insertion order
    incoming: DashMap<NodeId, Vec<NodeId>>,
}

/// Concurrent in-memory graph store
///
/// Cloning yields another handle onto the same graph. Inserts go through
/// the map entry API, so two racing inserts of one id produce exactly one
/// stored item and one `AlreadyExists`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Number of stored edges
    pub fn edge_count(&self) -> usize {
        self.inner.edges.len()
    }

    /// Replace a node's properties in place (fixture and repair use)
    pub fn replace_node(&self, node: Node) {
        self.inner.nodes.insert(node.id.clone(), node);
    }

    fn one_way(
        &self,
        adjacency: &DashMap<NodeId, Vec<NodeId>>,
        id: &NodeId,
        label: Option<&str>,
    ) -> Vec<NodeId> {
        let Some(list) = adjacency.get(id) else {
            return Vec::new();
        };
        list.iter()
            .filter(|n| match label {
                Some(label) => self
                    .inner
                    .nodes
                    .get(*n)
                    .map(|node| node.node_type == label)
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect()
    }
}

impl GraphStore for MemoryStore {
    fn exists_node(&self, id: &NodeId) -> StorageResult<bool> {
        Ok(self.inner.nodes.contains_key(id))
    }

    fn exists_edge(&self, id: &EdgeId) -> StorageResult<bool> {
        Ok(self.inner.edges.contains_key(id))
    }

    fn create_node(&self, node: &Node) -> StorageResult<()> {
        match self.inner.nodes.entry(node.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(node.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
                Ok(())
            }
        }
    }

    fn create_edge(&self, edge: &Edge) -> StorageResult<()> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.inner.nodes.contains_key(endpoint) {
                return Err(StorageError::MissingEndpoint(endpoint.clone()));
            }
        }

        match self.inner.edges.entry(edge.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(edge.id.to_string())),
            Entry::Vacant(slot) => {
                // Adjacency is appended while the edge slot is held so the
                // lists never see the same edge twice.
                self.inner
                    .outgoing
                    .entry(edge.source.clone())
                    .or_default()
                    .push(edge.target.clone());
                self.inner
                    .incoming
                    .entry(edge.target.clone())
                    .or_default()
                    .push(edge.source.clone());
                slot.insert(edge.clone());
                Ok(())
            }
        }
    }

    fn neighbors(
        &self,
        id: &NodeId,
        direction: Direction,
        label: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<NodeId>> {
        let mut found = match direction {
            Direction::Outgoing => self.one_way(&self.inner.outgoing, id, label),
            Direction::Incoming => self.one_way(&self.inner.incoming, id, label),
            Direction::Both => {
                let mut all = self.one_way(&self.inner.outgoing, id, label);
                all.extend(self.one_way(&self.inner.incoming, id, label));
                all
            }
        };
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        Ok(self.inner.nodes.get(id).map(|r| r.clone()))
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self) -> StorageResult<Box<dyn GraphStore>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_duplicate_node_keeps_first() {
        let store = MemoryStore::new();
        store
            .create_node(&Node::new(NodeId::target(1)).with_payload("first"))
            .unwrap();
        let err = store
            .create_node(&Node::new(NodeId::target(1)).with_payload("second"))
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.node_count(), 1);
        assert_eq!(
            store.get_node(&NodeId::target(1)).unwrap().unwrap().payload(),
            Some("first")
        );
    }

    #[test]
    fn test_edge_needs_both_endpoints() {
        let store = MemoryStore::new();
        store.create_node(&Node::new(NodeId::target(1))).unwrap();
        let err = store
            .create_edge(&Edge::new(NodeId::target(1), "card1-1".into(), "card1"))
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingEndpoint(_)));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_neighbors_follow_insertion_order() {
        let store = MemoryStore::new();
        for id in ["target-3", "target-1", "card1-7", "addr1-2"] {
            store.create_node(&Node::new(NodeId::from(id))).unwrap();
        }
        store
            .create_edge(&Edge::new("target-3".into(), "card1-7".into(), "card1"))
            .unwrap();
        store
            .create_edge(&Edge::new("target-1".into(), "card1-7".into(), "card1"))
            .unwrap();
        store
            .create_edge(&Edge::new("target-3".into(), "addr1-2".into(), "addr1"))
            .unwrap();

        let hub = NodeId::from("card1-7");
        assert_eq!(
            store.neighbors(&hub, Direction::Incoming, None, None).unwrap(),
            vec![NodeId::from("target-3"), NodeId::from("target-1")]
        );
        assert_eq!(
            store.neighbors(&hub, Direction::Both, None, Some(1)).unwrap(),
            vec![NodeId::from("target-3")]
        );
        assert_eq!(
            store
                .neighbors(&"target-3".into(), Direction::Outgoing, Some("addr1"), None)
                .unwrap(),
            vec![NodeId::from("addr1-2")]
        );
    }

    #[test]
    fn test_connections_share_the_graph() {
        let store = MemoryStore::new();
        let conn = store.connect().unwrap();
        conn.create_node(&Node::new(NodeId::target(9))).unwrap();
        assert!(store.exists_node(&NodeId::target(9)).unwrap());
    }

    #[test]
    fn test_racing_inserts_store_one_node() {
        let store = MemoryStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.create_node(&Node::new("card1-4000".into())))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(StorageError::is_already_exists));
        assert_eq!(store.node_count(), 1);
    }
}
