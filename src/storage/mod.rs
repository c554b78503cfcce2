//! Storage backends for the transaction graph
//!
//! Every backend implements the `GraphStore` trait. `SqliteStore` persists
//! to a file; `MemoryStore` keeps the graph in process. Requests obtain
//! their connection through a `StoreConnector`.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::{SqliteConnector, SqliteStore};
pub use traits::{GraphStore, OpenStore, StorageError, StorageResult, StoreConnector};
