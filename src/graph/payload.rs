//! Feature payload codec
//!
//! A node's features travel as one string property: a JSON object mapping
//! column name to value. Values may be numbers, numeric strings or null
//! (read as 0.0). The column list passed to [`decode_columns`] fixes the
//! vector layout.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors decoding a feature payload
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' is not numeric: {value}")]
    NotNumeric { column: String, value: String },
}

/// Column names of a category embedding: `val1..val<width>`
pub fn embedding_columns(width: usize) -> Vec<String> {
    (1..=width).map(|i| format!("val{}", i)).collect()
}

/// Serialize an ordered column map as a payload string
pub fn encode_payload(values: &Map<String, Value>) -> String {
    Value::Object(values.clone()).to_string()
}

/// Zero-filled embedding payload for a freshly created category node
pub fn placeholder_payload(width: usize) -> String {
    let values: Map<String, Value> = embedding_columns(width)
        .into_iter()
        .map(|col| (col, Value::String("0.0".to_string())))
        .collect();
    encode_payload(&values)
}

/// Read a scalar JSON value as a feature
pub fn scalar_to_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

/// Decode a payload into a feature vector laid out by `columns`
pub fn decode_columns(payload: &str, columns: &[String]) -> Result<Vec<f32>, PayloadError> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Object(map) = value else {
        return Err(PayloadError::NotAnObject);
    };

    columns
        .iter()
        .map(|col| {
            let raw = map
                .get(col)
                .ok_or_else(|| PayloadError::MissingColumn(col.clone()))?;
            scalar_to_f32(raw).ok_or_else(|| PayloadError::NotNumeric {
                column: col.clone(),
                value: raw.to_string(),
            })
        })
        .collect()
}
