//! Event normalizer: inbound records to a canonical target node.
//!
//! Produces the node id, the feature payload and the feature column order.
//! The column order is the layout contract every later stage decodes with,
//! so it depends only on the record's key order and the configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{AmountPolicy, PipelineConfig};
use crate::graph::payload::{encode_payload, scalar_to_f32};
use crate::graph::{LocalId, NodeId};

use super::error::{InferenceError, InferenceResult};

pub const TRANSACTION_ID: &str = "TransactionID";
pub const TRANSACTION_DT: &str = "TransactionDT";
pub const TRANSACTION_AMT: &str = "TransactionAmt";

/// Flat key to scalar mapping, in arrival order
pub type Record = Map<String, Value>;

/// An inbound inference event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceEvent {
    pub transaction_data: Vec<Record>,
    #[serde(default)]
    pub identity_data: Vec<Record>,
}

impl InferenceEvent {
    pub fn new(transaction: Record, identity: Option<Record>) -> Self {
        Self {
            transaction_data: vec![transaction],
            identity_data: identity.into_iter().collect(),
        }
    }

    /// The transaction record; only the first one is used
    pub fn transaction(&self) -> InferenceResult<&Record> {
        self.transaction_data
            .first()
            .ok_or_else(|| InferenceError::InvalidInput("event has no transaction_data".into()))
    }

    /// The identity record, if any
    pub fn identity(&self) -> Option<&Record> {
        self.identity_data.first()
    }

    pub fn normalize(&self, config: &PipelineConfig) -> InferenceResult<NormalizedEvent> {
        normalize_event(self.transaction()?, self.identity(), config)
    }
}

/// Canonical form of one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// `target-<TransactionID>`
    pub node_id: NodeId,
    /// Merged transaction and identity record with log amount and dummies
    pub record: Record,
    /// Feature columns only, nulls replaced by 0.0, in layout order
    pub payload: Record,
    /// Decoded payload
    pub features: Vec<f32>,
    /// `(column, value)` pairs that become category nodes
    pub identity_values: Vec<(String, String)>,
    pub feature_columns: Vec<String>,
    /// Identifier columns followed by identity record columns
    pub identifier_union: Vec<String>,
}

impl NormalizedEvent {
    pub fn local_id(&self) -> LocalId {
        self.node_id.local_id()
    }

    /// Serialized payload stored on the target node
    pub fn payload_string(&self) -> String {
        encode_payload(&self.payload)
    }
}

/// Literal string form of a scalar, as used for comparisons and node ids
pub fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn amount_of(value: &Value) -> InferenceResult<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount
        .filter(|a| a.is_finite())
        .ok_or_else(|| InferenceError::InvalidInput(format!("{} is not numeric: {}", TRANSACTION_AMT, value)))
}

fn log_amount(raw: f64, config: &PipelineConfig) -> InferenceResult<f64> {
    if raw > 0.0 {
        return Ok(raw.log10());
    }
    match config.amount_policy {
        AmountPolicy::Clamp => {
            tracing::debug!(raw, floor = config.amount_floor, "clamping non-positive amount");
            Ok(config.amount_floor.log10())
        }
        AmountPolicy::Reject => Err(InferenceError::InvalidInput(format!(
            "{} must be positive, got {}",
            TRANSACTION_AMT, raw
        ))),
    }
}

/// Source column of a dummy spec: the exact key, else the first key in
/// lexicographic order that starts with the prefix
fn dummy_source<'a>(record: &'a Record, prefix: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(prefix) {
        return Some(value);
    }
    record
        .keys()
        .filter(|k| k.starts_with(prefix))
        .min()
        .and_then(|k| record.get(k))
}

/// Normalize one transaction and its optional identity record
pub fn normalize_event(
    transaction: &Record,
    identity: Option<&Record>,
    config: &PipelineConfig,
) -> InferenceResult<NormalizedEvent> {
    if transaction.is_empty() {
        return Err(InferenceError::InvalidInput("empty transaction record".into()));
    }

    let raw_id = transaction
        .get(TRANSACTION_ID)
        .ok_or_else(|| InferenceError::MissingField(TRANSACTION_ID.into()))?;
    let local_id = LocalId::from_json(raw_id)
        .ok_or_else(|| InferenceError::MissingField(TRANSACTION_ID.into()))?;
    let node_id = NodeId::target(&local_id);

    let raw_amount = transaction
        .get(TRANSACTION_AMT)
        .ok_or_else(|| InferenceError::MissingField(TRANSACTION_AMT.into()))?;
    let amount = log_amount(amount_of(raw_amount)?, config)?;

    let identity = identity.filter(|r| !r.is_empty());
    let identity_columns: Vec<&String> = identity
        .map(|r| r.keys().filter(|k| k.as_str() != TRANSACTION_ID).collect())
        .unwrap_or_default();

    let excluded = |col: &str| {
        col == TRANSACTION_ID
            || col == TRANSACTION_DT
            || config.identifier_columns.iter().any(|c| c == col)
            || config.categorical_columns.iter().any(|c| c == col)
    };
    let mut feature_columns: Vec<String> = transaction
        .keys()
        .filter(|k| !excluded(k.as_str()))
        .cloned()
        .collect();

    let mut record = transaction.clone();
    if let Some(identity) = identity {
        for (k, v) in identity {
            record.insert(k.clone(), v.clone());
        }
    }
    let amount_value = serde_json::Number::from_f64(amount)
        .map(Value::Number)
        .ok_or_else(|| InferenceError::InvalidInput(format!("{} is not finite", TRANSACTION_AMT)))?;
    record.insert(TRANSACTION_AMT.to_string(), amount_value);

    let mut dummies = Vec::with_capacity(config.dummy_columns.len());
    for spec in &config.dummy_columns {
        let (prefix, expected) = config
            .split_dummy(spec)
            .ok_or_else(|| InferenceError::InvalidInput(format!("malformed dummy column '{}'", spec)))?;
        let hit = dummy_source(&record, prefix)
            .and_then(literal)
            .map(|v| v == expected)
            .unwrap_or(false);
        dummies.push((spec.clone(), if hit { 1.0 } else { 0.0 }));
    }
    for (spec, flag) in dummies {
        record.insert(spec.clone(), Value::from(flag));
        feature_columns.push(spec);
    }

    let mut payload = Record::new();
    let mut features = Vec::with_capacity(feature_columns.len());
    for col in &feature_columns {
        let value = match record.get(col) {
            None | Some(Value::Null) => Value::from(0.0),
            Some(v) => v.clone(),
        };
        let feature = scalar_to_f32(&value).ok_or_else(|| {
            InferenceError::InvalidInput(format!("feature column '{}' is not numeric: {}", col, value))
        })?;
        features.push(feature);
        payload.insert(col.clone(), value);
    }

    let mut identifier_union: Vec<String> = config.identifier_columns.clone();
    for col in identity_columns {
        if !identifier_union.contains(col) {
            identifier_union.push(col.clone());
        }
    }

    let identity_values = identifier_union
        .iter()
        .filter_map(|col| {
            record
                .get(col)
                .and_then(literal)
                .map(|value| (col.clone(), value))
        })
        .collect();

    tracing::debug!(
        node = %node_id,
        features = feature_columns.len(),
        identifiers = identifier_union.len(),
        "normalized event"
    );

    Ok(NormalizedEvent {
        node_id,
        record,
        payload,
        features,
        identity_values,
        feature_columns,
        identifier_union,
    })
}
