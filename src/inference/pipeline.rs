//! Inference request handler
//!
//! One linear pass per request: normalize, mutate, extract, score, emit.
//! Store connections are opened per stage and dropped when the stage ends.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::emit::{DecisionMessage, DecisionSink};
use crate::graph::LocalId;
use crate::model::{ScoringEndpoint, ScoringRequest};
use crate::storage::StoreConnector;

use super::error::InferenceResult;
use super::extractor::{SubgraphExtractor, TargetContext};
use super::mutator::GraphMutator;
use super::normalizer::{normalize_event, InferenceEvent, Record};

/// Result returned to the caller of one inference request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutcome {
    pub id: LocalId,
    pub is_fraud: bool,
    pub probability: f32,
    pub elapsed_ms: u64,
    /// Neighbor nodes skipped for unreadable payloads
    pub dropped_nodes: usize,
}

/// The real-time inference path
pub struct InferencePipeline {
    config: PipelineConfig,
    connector: Arc<dyn StoreConnector>,
    endpoint: Arc<dyn ScoringEndpoint>,
    sink: Arc<dyn DecisionSink>,
}

fn millis(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl InferencePipeline {
    pub fn new(
        config: PipelineConfig,
        connector: Arc<dyn StoreConnector>,
        endpoint: Arc<dyn ScoringEndpoint>,
        sink: Arc<dyn DecisionSink>,
    ) -> Self {
        Self {
            config,
            connector,
            endpoint,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run an inbound event envelope through the pipeline
    pub async fn handle_event(&self, event: &InferenceEvent) -> InferenceResult<InferenceOutcome> {
        self.handle_inference_request(event.transaction()?, event.identity())
            .await
    }

    /// Score one transaction and publish the decision.
    ///
    /// Any error aborts before a decision is emitted. A sink failure after
    /// scoring is logged and does not change the outcome.
    pub async fn handle_inference_request(
        &self,
        transaction: &Record,
        identity: Option<&Record>,
    ) -> InferenceResult<InferenceOutcome> {
        let started = Instant::now();

        let event = normalize_event(transaction, identity, &self.config)?;
        tracing::info!(target = %event.node_id, elapsed_ms = millis(started), "normalized event");

        {
            let store = self.connector.connect()?;
            let mutator = GraphMutator::new(store.as_ref(), self.config.embedding_width);
            mutator.upsert_target(&event.node_id, &event.payload_string())?;
            let report = mutator.upsert_category_members(&event.node_id, &event.identity_values)?;
            tracing::info!(
                target = %event.node_id,
                nodes_created = report.nodes_created,
                edges_created = report.edges_created,
                elapsed_ms = millis(started),
                "mutated graph"
            );
        }

        let subgraph = {
            let store = self.connector.connect()?;
            SubgraphExtractor::from_config(&self.config).extract(
                store.as_ref(),
                &TargetContext::from_event(&event),
                self.config.max_fanout,
            )?
        };

        let request = ScoringRequest {
            n_feats: subgraph.n_feats(),
            graph: subgraph.edge_views,
            target_id: event.local_id(),
        };
        let probability = self.endpoint.score(&request).await?;
        let is_fraud = probability > self.config.decision_threshold;
        tracing::info!(
            target = %event.node_id,
            endpoint = self.endpoint.name(),
            probability,
            is_fraud,
            elapsed_ms = millis(started),
            "scored transaction"
        );

        let message = DecisionMessage::from_transaction(event.local_id(), is_fraud, transaction);
        if let Err(e) = self.sink.send(&message).await {
            tracing::warn!(target = %event.node_id, error = %e, "failed to publish decision");
        }

        Ok(InferenceOutcome {
            id: event.local_id(),
            is_fraud,
            probability,
            elapsed_ms: millis(started),
            dropped_nodes: subgraph.report.dropped.len(),
        })
    }
}
