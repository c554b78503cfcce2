//! SQLite storage backend

use super::traits::{GraphStore, OpenStore, StorageError, StorageResult, StoreConnector};
use crate::graph::{Edge, EdgeId, Node, NodeId};
use crate::query::Direction;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a writer waits on a locked database before giving up
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed graph store
///
/// Uses a single SQLite database file with tables for nodes and edges.
/// Thread-safe via internal mutex on the connection. Neighbor order is
/// edge insertion order (rowid).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                properties_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relationship TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

            -- Concurrent readers while a request writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn node_exists_with(conn: &Connection, id: &str) -> StorageResult<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// One direction of a neighbor lookup
    fn neighbors_one_way(
        conn: &Connection,
        id: &NodeId,
        outgoing: bool,
        label: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<NodeId>> {
        let (near, far) = if outgoing {
            ("source_id", "target_id")
        } else {
            ("target_id", "source_id")
        };
        let sql = format!(
            "SELECT e.{far} FROM edges e JOIN nodes n ON n.id = e.{far}
             WHERE e.{near} = ?1 AND (?2 IS NULL OR n.node_type = ?2)
             ORDER BY e.rowid
             LIMIT ?3",
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![id.as_str(), label, limit], |row| row.get::<_, String>(0))?
            .map(|r| r.map(NodeId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl GraphStore for SqliteStore {
    fn exists_node(&self, id: &NodeId) -> StorageResult<bool> {
        let conn = self.lock()?;
        Self::node_exists_with(&conn, id.as_str())
    }

    fn exists_edge(&self, id: &EdgeId) -> StorageResult<bool> {
        let conn = self.lock()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE id = ?1)",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn create_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.lock()?;
        let properties = serde_json::to_string(&node.properties)?;
        let rows = conn.execute(
            "INSERT INTO nodes (id, node_type, properties_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![node.id.as_str(), node.node_type, properties],
        )?;
        if rows == 0 {
            return Err(StorageError::AlreadyExists(node.id.to_string()));
        }
        Ok(())
    }

    fn create_edge(&self, edge: &Edge) -> StorageResult<()> {
        let conn = self.lock()?;
        for endpoint in [&edge.source, &edge.target] {
            if !Self::node_exists_with(&conn, endpoint.as_str())? {
                return Err(StorageError::MissingEndpoint(endpoint.clone()));
            }
        }
        let rows = conn.execute(
            "INSERT INTO edges (id, source_id, target_id, relationship) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![
                edge.id.as_str(),
                edge.source.as_str(),
                edge.target.as_str(),
                edge.relationship
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::AlreadyExists(edge.id.to_string()));
        }
        Ok(())
    }

    fn neighbors(
        &self,
        id: &NodeId,
        direction: Direction,
        label: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<NodeId>> {
        let conn = self.lock()?;
        let mut found = match direction {
            Direction::Outgoing => Self::neighbors_one_way(&conn, id, true, label, limit)?,
            Direction::Incoming => Self::neighbors_one_way(&conn, id, false, label, limit)?,
            Direction::Both => {
                let mut all = Self::neighbors_one_way(&conn, id, true, label, limit)?;
                all.extend(Self::neighbors_one_way(&conn, id, false, label, limit)?);
                all
            }
        };
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT node_type, properties_json FROM nodes WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((node_type, properties)) => Ok(Some(Node {
                id: id.clone(),
                node_type,
                properties: serde_json::from_str(&properties)?,
            })),
            None => Ok(None),
        }
    }
}

/// Opens a fresh [`SqliteStore`] connection per request
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreConnector for SqliteConnector {
    fn connect(&self) -> StorageResult<Box<dyn GraphStore>> {
        Ok(Box::new(SqliteStore::open(&self.path)?))
    }
}
