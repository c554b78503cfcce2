//! Common test utilities for the inference pipeline suites
//!
//! A deliberately narrow configuration keeps the feature layout small:
//! `TransactionAmt`, `C1` and the `Pr_W` dummy, so the category embedding
//! width and the model input width are both 3.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use fraudgraph::inference::Record;
use fraudgraph::model::GraphMetadata;
use fraudgraph::{
    DecisionMessage, DecisionSink, InferencePipeline, LocalEndpoint, MemorySink, ModelArtifact,
    ModelContext, ScoringEndpoint, SinkError, StoreConnector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

pub const FEATURE_WIDTH: usize = 3;
pub const HIDDEN: usize = 4;

pub fn config() -> fraudgraph::PipelineConfig {
    fraudgraph::PipelineConfig {
        identifier_columns: vec!["card1".into(), "addr1".into(), "ProductCD".into()],
        categorical_columns: vec![],
        dummy_columns: vec!["Pr_W".into()],
        embedding_width: FEATURE_WIDTH,
        hidden_size: HIDDEN,
        ..fraudgraph::PipelineConfig::default()
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

/// A transaction sharing `card1` and `addr1` values with its peers
pub fn transaction(id: i64, amount: f64, card1: &str, addr1: &str) -> Record {
    record(json!({
        "TransactionID": id,
        "TransactionAmt": amount,
        "C1": 1.0,
        "card1": card1,
        "addr1": addr1,
        "ProductCD": "W"
    }))
}

/// Seeded model covering every relation the fixture config can produce
pub fn artifact(seed: u64) -> ModelArtifact {
    let pairs: Vec<(String, String)> = ["card1", "addr1", "ProductCD"]
        .iter()
        .map(|dst| ("target".to_string(), dst.to_string()))
        .collect();
    let metadata = GraphMetadata::for_relations(&pairs, FEATURE_WIDTH);
    let mut rng = StdRng::seed_from_u64(seed);
    ModelArtifact::initialize(metadata, FEATURE_WIDTH, HIDDEN, 2, &mut rng)
}

pub fn local_endpoint(seed: u64) -> Arc<dyn ScoringEndpoint> {
    let context = ModelContext::from_artifact(&artifact(seed)).expect("fixture artifact is valid");
    Arc::new(LocalEndpoint::new(Arc::new(context)))
}

pub fn pipeline(
    connector: Arc<dyn StoreConnector>,
    endpoint: Arc<dyn ScoringEndpoint>,
    sink: Arc<dyn DecisionSink>,
) -> InferencePipeline {
    InferencePipeline::new(config(), connector, endpoint, sink)
}

pub fn memory_sink() -> Arc<MemorySink> {
    Arc::new(MemorySink::new())
}

/// Sink whose queue is always down
pub struct FailingSink;

#[async_trait]
impl DecisionSink for FailingSink {
    async fn send(&self, _message: &DecisionMessage) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("queue is down".into()))
    }
}
