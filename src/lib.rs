//! fraudgraph: real-time graph fraud scoring
//!
//! Each inbound transaction is written into a property graph next to the
//! card, address and e-mail nodes it shares with earlier transactions. Its
//! two-hop neighborhood is then pulled back out, rebuilt as a dense
//! heterogeneous graph and scored by an R-GCN.
//!
//! # Core Concepts
//!
//! - **Target node**: the transaction being scored, `target-<TransactionID>`
//! - **Category node**: a shared attribute value, `<column>-<value>`
//! - **Edge views**: per-relation lists of local ids pulled from the store
//! - **Dense graph**: contiguous per-type ids, forward and reverse relations
//!   and a target self-loop, ready for message passing
//!
//! # Example
//!
//! ```
//! use fraudgraph::{GraphStore, MemoryStore, Node, NodeId};
//!
//! let store = MemoryStore::new();
//! store.create_node(&Node::new(NodeId::target(5001))).unwrap();
//! assert!(store.exists_node(&NodeId::target(5001)).unwrap());
//! ```

pub mod config;
pub mod emit;
mod graph;
pub mod inference;
pub mod model;
pub mod query;
pub mod storage;

pub use config::{AmountPolicy, ConfigError, PipelineConfig};
pub use emit::{DecisionMessage, DecisionSink, JsonLinesSink, MemorySink, SinkError};
pub use graph::payload;
pub use graph::{Edge, EdgeId, LocalId, Node, NodeId, Properties, PropertyValue, PAYLOAD_KEY, TARGET_TYPE};
pub use inference::{
    InferenceError, InferenceEvent, InferenceOutcome, InferencePipeline, InferenceResult,
};
pub use model::{
    HttpEndpoint, LocalEndpoint, MockEndpoint, ModelArtifact, ModelContext, ScoringEndpoint,
    ScoringRequest,
};
pub use query::{Direction, TraversalPlan};
pub use storage::{
    GraphStore, MemoryStore, OpenStore, SqliteConnector, SqliteStore, StorageError, StorageResult,
    StoreConnector,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
