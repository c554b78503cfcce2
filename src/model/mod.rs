//! Scoring model: R-GCN forward pass, artifacts and endpoints

mod artifact;
mod context;
mod endpoint;
mod error;
mod rgcn;

pub use artifact::{FeatureStats, GraphMetadata, ModelArtifact, OUT_SIZE};
pub use context::ModelContext;
pub use endpoint::{
    parse_probability, HttpEndpoint, LocalEndpoint, MockEndpoint, ScoringEndpoint, ScoringRequest,
};
pub use error::{ModelError, ScoringError};
pub use rgcn::{leaky_relu, softmax, FeatureMap, HeteroRgcn, HeteroRgcnLayer, Linear, LEAKY_RELU_SLOPE};
