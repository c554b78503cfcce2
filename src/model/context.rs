//! Loaded model state shared by every request

use std::path::Path;

use crate::inference::reconstruct;

use super::artifact::{FeatureStats, GraphMetadata, ModelArtifact};
use super::endpoint::ScoringRequest;
use super::error::{ModelError, ScoringError};
use super::rgcn::HeteroRgcn;

/// Immutable model context, built once at startup and passed by reference
#[derive(Debug, Clone)]
pub struct ModelContext {
    model: HeteroRgcn,
    stats: FeatureStats,
    metadata: GraphMetadata,
}

impl ModelContext {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self, ModelError> {
        artifact.validate()?;
        Ok(Self {
            model: artifact.to_model(),
            stats: artifact.metadata.stats(),
            metadata: artifact.metadata.clone(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let artifact = ModelArtifact::load(path)?;
        tracing::info!(
            etypes = artifact.metadata.etypes.len(),
            input = artifact.input_size,
            hidden = artifact.hidden_size,
            layers = artifact.layers.len(),
            "loaded model"
        );
        Self::from_artifact(&artifact)
    }

    pub fn stats(&self) -> &FeatureStats {
        &self.stats
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    /// Reconstruct the request's graph and score its target
    pub fn score(&self, request: &ScoringRequest) -> Result<f32, ScoringError> {
        let dense = reconstruct::build(&request.graph, &request.n_feats, &request.target_id, &self.stats)?;
        let probability = self.model.score(&dense.graph, &dense.features, dense.target)?;
        tracing::debug!(target = %request.target_id, dense_target = dense.target, probability, "scored");
        Ok(probability)
    }
}
