//! Storage trait definitions

use crate::graph::{Edge, EdgeId, Node, NodeId, Properties};
use crate::query::Direction;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Edge endpoint not found: {0}")]
    MissingEndpoint(NodeId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// True for duplicate-identity inserts, which idempotent writers treat as success
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A key-by-id graph store with traversal primitives.
///
/// Inserts never overwrite: creating a node or edge whose id already exists
/// fails with [`StorageError::AlreadyExists`] and leaves the stored item
/// untouched. Implementations must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    /// Check whether a node with this id exists
    fn exists_node(&self, id: &NodeId) -> StorageResult<bool>;

    /// Check whether an edge with this id exists
    fn exists_edge(&self, id: &EdgeId) -> StorageResult<bool>;

    /// Insert a node
    fn create_node(&self, node: &Node) -> StorageResult<()>;

    /// Insert an edge; both endpoints must already exist
    fn create_edge(&self, edge: &Edge) -> StorageResult<()>;

    /// Neighbors of a node in insertion order.
    ///
    /// `label` filters on the neighbor's node type; `limit` caps the result.
    fn neighbors(
        &self,
        id: &NodeId,
        direction: Direction,
        label: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<NodeId>>;

    /// Load a node with its properties
    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Load only a node's properties
    fn get_properties(&self, id: &NodeId) -> StorageResult<Option<Properties>> {
        Ok(self.get_node(id)?.map(|node| node.properties))
    }
}

/// Hands out request-scoped store connections.
///
/// Each call yields a fresh connection that is released when dropped;
/// connectors never pool or cache connections.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> StorageResult<Box<dyn GraphStore>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
