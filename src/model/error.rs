//! Model and scoring errors

use thiserror::Error;

use crate::inference::ReconstructError;

/// Errors loading a model or running its forward pass
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{what}: expected shape {expected:?}, found {found:?}")]
    Shape {
        what: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("no weights for relation '{0}'")]
    UnknownRelation(String),

    #[error("relation '{relation}' references node {index} beyond {count} {node_type} nodes")]
    EdgeOutOfRange {
        relation: String,
        node_type: String,
        index: usize,
        count: usize,
    },

    #[error("model has no R-GCN layers")]
    NoLayers,

    #[error("no target representation after the last layer")]
    NoTargetRepresentation,

    #[error("target index {index} out of range for {count} target nodes")]
    TargetOutOfRange { index: usize, count: usize },
}

/// Errors from a scoring endpoint
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("graph reconstruction failed: {0}")]
    Reconstruct(#[from] ReconstructError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint response: {0}")]
    InvalidResponse(String),

    #[error("endpoint unavailable: {0}")]
    Unavailable(String),
}
