//! Real-time inference path
//!
//! Normalizer, mutator, extractor and reconstructor, wired together by
//! `InferencePipeline`.

mod error;
mod extractor;
mod mutator;
mod normalizer;
mod pipeline;
pub mod reconstruct;

pub use error::{InferenceError, InferenceResult};
pub use extractor::{
    relation_name, EdgeViews, ExtractedSubgraph, ExtractionReport, FeatureTable, SubgraphExtractor,
    TargetContext, RELATION_SEPARATOR,
};
pub use mutator::{GraphMutator, MutationReport};
pub use normalizer::{
    literal, normalize_event, InferenceEvent, NormalizedEvent, Record, TRANSACTION_AMT,
    TRANSACTION_DT, TRANSACTION_ID,
};
pub use pipeline::{InferenceOutcome, InferencePipeline};
pub use reconstruct::{build, DenseGraph, HeteroGraph, ReconstructError, Relation, SELF_RELATION};
