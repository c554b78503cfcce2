//! Request-level error taxonomy

use thiserror::Error;

use crate::graph::{LocalId, NodeId};
use crate::model::ScoringError;
use crate::query::TraversalError;
use crate::storage::StorageError;

use super::reconstruct::ReconstructError;

/// Errors that abort an inference request
///
/// `MalformedPayload` is the one variant extraction recovers from locally;
/// it reaches the caller only when the target's own payload is unreadable.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no feature vector for {node_type} node {local_id}")]
    MissingFeature { node_type: String, local_id: LocalId },

    #[error("target {0} not present in reconstructed graph")]
    TargetNotFound(LocalId),

    #[error("malformed payload on {node}: {reason}")]
    MalformedPayload { node: NodeId, reason: String },

    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),

    /// The model cannot score this graph; retrying gives the same result
    #[error("model rejected graph: {0}")]
    ModelRejected(String),
}

impl InferenceError {
    /// Transient failures a caller may retry with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::StoreUnavailable(_) | InferenceError::ScoringUnavailable(_)
        )
    }

    /// Failures caused by the request itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InferenceError::InvalidInput(_) | InferenceError::MissingField(_)
        )
    }
}

impl From<StorageError> for InferenceError {
    fn from(err: StorageError) -> Self {
        InferenceError::StoreUnavailable(err.to_string())
    }
}

impl From<TraversalError> for InferenceError {
    fn from(err: TraversalError) -> Self {
        InferenceError::StoreUnavailable(err.to_string())
    }
}

impl From<ReconstructError> for InferenceError {
    fn from(err: ReconstructError) -> Self {
        match err {
            ReconstructError::MissingFeature { node_type, local_id } => {
                InferenceError::MissingFeature { node_type, local_id }
            }
            ReconstructError::TargetNotFound(id) => InferenceError::TargetNotFound(id),
            other => InferenceError::InvalidInput(other.to_string()),
        }
    }
}

impl From<ScoringError> for InferenceError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Reconstruct(inner) => inner.into(),
            ScoringError::Model(inner) => InferenceError::ModelRejected(inner.to_string()),
            other => InferenceError::ScoringUnavailable(other.to_string()),
        }
    }
}

/// Result type for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;

    #[test]
    fn test_retry_and_client_classes_are_disjoint() {
        let store = InferenceError::from(StorageError::Unavailable("down".into()));
        assert!(store.is_retryable());
        assert!(!store.is_client_error());

        let missing = InferenceError::MissingField("TransactionID".into());
        assert!(missing.is_client_error());
        assert!(!missing.is_retryable());

        let internal = InferenceError::TargetNotFound(LocalId::Numeric(1));
        assert!(!internal.is_retryable());
        assert!(!internal.is_client_error());
    }

    #[test]
    fn test_traversal_budget_surfaces_as_store_unavailable() {
        let err = InferenceError::from(TraversalError::BudgetExhausted(10));
        assert!(matches!(err, InferenceError::StoreUnavailable(_)));
    }

    #[test]
    fn test_reconstruction_failures_keep_their_identity() {
        let err = InferenceError::from(ScoringError::Reconstruct(ReconstructError::MissingFeature {
            node_type: "card1".into(),
            local_id: LocalId::Numeric(4000),
        }));
        assert!(matches!(err, InferenceError::MissingFeature { ref node_type, .. } if node_type == "card1"));
    }

    #[test]
    fn test_model_errors_are_not_retryable() {
        let err = InferenceError::from(ScoringError::Model(ModelError::UnknownRelation(
            "target<>DeviceType".into(),
        )));
        assert!(matches!(err, InferenceError::ModelRejected(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_client_error());

        let transport = InferenceError::from(ScoringError::Unavailable("timeout".into()));
        assert!(transport.is_retryable());
    }
}
