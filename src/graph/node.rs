//! Node representation in the transaction graph

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Node type of the transaction being scored and of every transaction vertex.
pub const TARGET_TYPE: &str = "target";

/// Property key holding a node's serialized feature payload.
pub const PAYLOAD_KEY: &str = "props_values";

/// Identifier of a node within its type.
///
/// Transaction ids are numeric; category values (e-mail domains, product
/// codes) may be text. Numeric ids order numerically and before text ids,
/// which fixes the dense-id assignment order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalId {
    Numeric(i64),
    Text(String),
}

impl LocalId {
    /// Parse a local id from its string form.
    ///
    /// Only canonical integers (`"42"`, `"-7"`, never `"007"`) become numeric,
    /// so the string form round-trips.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => LocalId::Numeric(n),
            _ => LocalId::Text(raw.to_string()),
        }
    }

    /// Build a local id from a scalar JSON value.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(LocalId::Numeric(i)),
                None => n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        LocalId::Numeric(f as i64)
                    } else {
                        LocalId::Text(n.to_string())
                    }
                }),
            },
            serde_json::Value::String(s) => Some(LocalId::parse(s)),
            serde_json::Value::Bool(b) => Some(LocalId::Text(b.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalId::Numeric(n) => write!(f, "{}", n),
            LocalId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for LocalId {
    fn from(n: i64) -> Self {
        LocalId::Numeric(n)
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        LocalId::parse(s)
    }
}

impl Serialize for LocalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LocalId::Numeric(n) => serializer.serialize_i64(*n),
            LocalId::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for LocalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocalIdVisitor;

        impl<'de> Visitor<'de> for LocalIdVisitor {
            type Value = LocalId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or string node id")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LocalId, E> {
                Ok(LocalId::Numeric(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LocalId, E> {
                i64::try_from(v)
                    .map(LocalId::Numeric)
                    .map_err(|_| E::custom(format!("node id {} out of range", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LocalId, E> {
                Ok(LocalId::parse(v))
            }
        }

        deserializer.deserialize_any(LocalIdVisitor)
    }
}

/// Unique identifier for a node, serialized as `"<type>-<local_id>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Compose a node id from its type and local id
    pub fn new(node_type: &str, local_id: impl fmt::Display) -> Self {
        Self(format!("{}-{}", node_type, local_id))
    }

    /// Id of the transaction vertex with the given local id
    pub fn target(local_id: impl fmt::Display) -> Self {
        Self::new(TARGET_TYPE, local_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The node type: everything before the first `-`.
    pub fn node_type(&self) -> &str {
        match self.0.find('-') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The raw local id: everything after the first `-`.
    pub fn local_part(&self) -> &str {
        match self.0.find('-') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    pub fn local_id(&self) -> LocalId {
        LocalId::parse(self.local_part())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Properties collection
pub type Properties = HashMap<String, PropertyValue>;

/// A vertex in the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Vertex label: `target` for transactions, the column name for categories
    pub node_type: String,
    pub properties: Properties,
}

impl Node {
    /// Create a node whose type is taken from its id
    pub fn new(id: NodeId) -> Self {
        let node_type = id.node_type().to_string();
        Self {
            id,
            node_type,
            properties: HashMap::new(),
        }
    }

    /// Add a property to the node
    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Attach a serialized feature payload
    pub fn with_payload(self, payload: impl Into<String>) -> Self {
        self.with_property(PAYLOAD_KEY, PropertyValue::String(payload.into()))
    }

    /// The serialized feature payload, if present
    pub fn payload(&self) -> Option<&str> {
        self.properties.get(PAYLOAD_KEY).and_then(PropertyValue::as_str)
    }
}
