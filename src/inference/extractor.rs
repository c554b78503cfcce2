//! Subgraph extractor: the target's two-hop neighborhood as edge views
//! and feature tables.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::graph::payload::{decode_columns, embedding_columns, PayloadError};
use crate::graph::{LocalId, NodeId, TARGET_TYPE};
use crate::query::{Direction, TraversalBudget, TraversalPlan};
use crate::storage::GraphStore;

use super::error::{InferenceError, InferenceResult};
use super::normalizer::NormalizedEvent;

/// Separator between source and destination type in a relation name
pub const RELATION_SEPARATOR: &str = "<>";

/// Relation name to parallel (source, destination) local id lists
pub type EdgeViews = BTreeMap<String, (Vec<LocalId>, Vec<LocalId>)>;

/// Node type to local id to feature vector
pub type FeatureTable = BTreeMap<String, BTreeMap<LocalId, Vec<f32>>>;

/// Compose a relation name from its endpoint types
pub fn relation_name(src_type: &str, dst_type: &str) -> String {
    format!("{}{}{}", src_type, RELATION_SEPARATOR, dst_type)
}

/// What an extraction needs to know about its target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetContext {
    pub node_id: NodeId,
    /// Feature vector already known from normalization
    pub features: Vec<f32>,
    pub feature_columns: Vec<String>,
    /// Labels of the category hops to collect neighbor payloads through
    pub identifier_columns: Vec<String>,
}

impl TargetContext {
    pub fn from_event(event: &NormalizedEvent) -> Self {
        Self {
            node_id: event.node_id.clone(),
            features: event.features.clone(),
            feature_columns: event.feature_columns.clone(),
            identifier_columns: event.identifier_union.clone(),
        }
    }

    /// Rebuild the context of a stored transaction.
    ///
    /// The payload's key order is the feature column order it was written
    /// with. Category labels attached to the node are added to
    /// `identifier_columns` when missing.
    pub fn load(
        store: &dyn GraphStore,
        node_id: &NodeId,
        identifier_columns: &[String],
    ) -> InferenceResult<Self> {
        let node = store
            .get_node(node_id)?
            .ok_or_else(|| InferenceError::InvalidInput(format!("no such transaction: {}", node_id)))?;
        let payload = node.payload().ok_or_else(|| InferenceError::MalformedPayload {
            node: node_id.clone(),
            reason: "no payload property".into(),
        })?;

        let malformed = |reason: String| InferenceError::MalformedPayload {
            node: node_id.clone(),
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;
        let feature_columns: Vec<String> = value
            .as_object()
            .ok_or_else(|| malformed(PayloadError::NotAnObject.to_string()))?
            .keys()
            .cloned()
            .collect();
        let features =
            decode_columns(payload, &feature_columns).map_err(|e| malformed(e.to_string()))?;

        let mut identifier_columns = identifier_columns.to_vec();
        for category in store.neighbors(node_id, Direction::Outgoing, None, None)? {
            let label = category.node_type().to_string();
            if !identifier_columns.contains(&label) {
                identifier_columns.push(label);
            }
        }

        Ok(Self {
            node_id: node_id.clone(),
            features,
            feature_columns,
            identifier_columns,
        })
    }
}

/// Observability counters of one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Nodes whose payload could not be read
    pub dropped: Vec<NodeId>,
    /// Store calls issued
    pub traversal_calls: usize,
}

/// Request-scoped view of the target's neighborhood
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSubgraph {
    pub edge_views: EdgeViews,
    /// Transaction feature vectors, always containing the target
    pub raw_features: FeatureTable,
    /// Embedding vectors of the target's category nodes
    pub category_embeddings: FeatureTable,
    pub report: ExtractionReport,
}

impl ExtractedSubgraph {
    /// Transaction features and category embeddings in one table
    pub fn n_feats(&self) -> FeatureTable {
        let mut all = self.raw_features.clone();
        for (ntype, table) in &self.category_embeddings {
            all.entry(ntype.clone()).or_default().extend(
                table.iter().map(|(id, v)| (id.clone(), v.clone())),
            );
        }
        all
    }
}

/// Bounded two-hop traversal around a target transaction
#[derive(Debug, Clone)]
pub struct SubgraphExtractor {
    embedding_width: usize,
    timeout: Option<Duration>,
}

impl SubgraphExtractor {
    pub fn new(embedding_width: usize, timeout: Option<Duration>) -> Self {
        Self {
            embedding_width,
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.embedding_width,
            Some(Duration::from_millis(config.traversal_timeout_ms)),
        )
    }

    /// Store calls an extraction may issue
    pub fn call_budget(categories: usize, identifiers: usize, max_fanout: usize) -> usize {
        1 + 2 * categories + identifiers * (2 + max_fanout)
    }

    pub fn extract(
        &self,
        store: &dyn GraphStore,
        target: &TargetContext,
        max_fanout: usize,
    ) -> InferenceResult<ExtractedSubgraph> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let target_local = target.node_id.local_id();

        // Categories attached to the target
        let mut feature_list = TraversalPlan::from(target.node_id.clone())
            .expand(Direction::Outgoing, None, None)
            .execute(store, &mut TraversalBudget::until(1, deadline))?;
        let mut seen = HashSet::new();
        feature_list.retain(|id| seen.insert(id.clone()));

        let mut budget = TraversalBudget::until(
            Self::call_budget(feature_list.len(), target.identifier_columns.len(), max_fanout),
            deadline,
        );

        // Transactions sharing each category with the target
        let mut edge_views = EdgeViews::new();
        for category in &feature_list {
            let reached = TraversalPlan::from(category.clone())
                .both()
                .limit(max_fanout)
                .execute(store, &mut budget)?;

            let mut members: Vec<LocalId> = reached
                .iter()
                .filter(|n| n.node_type() == TARGET_TYPE)
                .map(NodeId::local_id)
                .collect();
            members.push(target_local.clone());
            members.sort();
            members.dedup();

            let value = LocalId::parse(category.local_part());
            let values = vec![value; members.len()];
            edge_views.insert(relation_name(TARGET_TYPE, category.node_type()), (members, values));
        }
        tracing::debug!(relations = edge_views.len(), "collected edge views");

        // Wider two-hop neighborhood for payloads, one branch per identifier label
        let plans: Vec<TraversalPlan> = target
            .identifier_columns
            .iter()
            .map(|label| {
                TraversalPlan::from(target.node_id.clone())
                    .both()
                    .has_label(label.as_str())
                    .both()
                    .limit(max_fanout)
            })
            .collect();
        let mut neighborhood = TraversalPlan::union(&plans, store, &mut budget)?;
        let mut seen = HashSet::new();
        neighborhood.retain(|id| id.node_type() == TARGET_TYPE && seen.insert(id.clone()));
        tracing::debug!(nodes = neighborhood.len(), "collected neighborhood");

        let mut report = ExtractionReport::default();
        let mut transactions: BTreeMap<LocalId, Vec<f32>> = BTreeMap::new();
        for node_id in neighborhood.iter().filter(|id| **id != target.node_id) {
            budget.charge()?;
            match self.node_features(store, node_id, &target.feature_columns)? {
                Ok(features) => {
                    transactions.insert(node_id.local_id(), features);
                }
                Err(reason) => {
                    tracing::warn!(node = %node_id, %reason, "dropping node with malformed payload");
                    report.dropped.push(node_id.clone());
                }
            }
        }
        transactions.insert(target_local.clone(), target.features.clone());

        let columns = embedding_columns(self.embedding_width);
        let mut category_embeddings = FeatureTable::new();
        for category in &feature_list {
            budget.charge()?;
            match self.node_features(store, category, &columns)? {
                Ok(embedding) => {
                    category_embeddings
                        .entry(category.node_type().to_string())
                        .or_default()
                        .insert(LocalId::parse(category.local_part()), embedding);
                }
                Err(reason) => {
                    tracing::warn!(node = %category, %reason, "dropping category with malformed embedding");
                    report.dropped.push(category.clone());
                }
            }
        }

        // Keep edge views consistent with the feature table
        for (relation, (sources, destinations)) in edge_views.iter_mut() {
            let before = sources.len();
            let (kept_sources, kept_destinations): (Vec<_>, Vec<_>) = sources
                .drain(..)
                .zip(destinations.drain(..))
                .filter(|(src, _)| transactions.contains_key(src))
                .unzip();
            *sources = kept_sources;
            *destinations = kept_destinations;
            if sources.len() != before {
                tracing::debug!(%relation, pruned = before - sources.len(), "pruned unreadable members");
            }
        }

        report.traversal_calls = budget.calls() + 1;
        tracing::info!(
            target = %target.node_id,
            relations = edge_views.len(),
            transactions = transactions.len(),
            dropped = report.dropped.len(),
            calls = report.traversal_calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extracted subgraph"
        );

        let mut raw_features = FeatureTable::new();
        raw_features.insert(TARGET_TYPE.to_string(), transactions);

        Ok(ExtractedSubgraph {
            edge_views,
            raw_features,
            category_embeddings,
            report,
        })
    }

    /// Fetch and decode one node's payload.
    ///
    /// The outer result is the store call; the inner one is the payload,
    /// whose failure only drops the node.
    fn node_features(
        &self,
        store: &dyn GraphStore,
        node_id: &NodeId,
        columns: &[String],
    ) -> InferenceResult<Result<Vec<f32>, String>> {
        let Some(node) = store.get_node(node_id)? else {
            return Ok(Err("node vanished".to_string()));
        };
        let Some(payload) = node.payload() else {
            return Ok(Err("no payload property".to_string()));
        };
        Ok(decode_columns(payload, columns).map_err(|e| e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::graph::{Edge, EdgeId, Node};
    use crate::inference::GraphMutator;
    use crate::storage::{MemoryStore, StorageResult};

    const WIDTH: usize = 3;

    fn columns() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn payload(a: f32, b: f32) -> String {
        format!(r#"{{"a": {}, "b": {}}}"#, a, b)
    }

    fn context(id: i64, a: f32, b: f32) -> TargetContext {
        TargetContext {
            node_id: NodeId::target(id),
            features: vec![a, b],
            feature_columns: columns(),
            identifier_columns: vec!["card1".into(), "addr1".into()],
        }
    }

    fn add_transaction(store: &MemoryStore, id: i64, a: f32, b: f32, cats: &[(&str, &str)]) {
        let mutator = GraphMutator::new(store, WIDTH);
        let target = NodeId::target(id);
        mutator.upsert_target(&target, &payload(a, b)).unwrap();
        let pairs: Vec<_> = cats
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect();
        mutator.upsert_category_members(&target, &pairs).unwrap();
    }

    fn extractor() -> SubgraphExtractor {
        SubgraphExtractor::new(WIDTH, Some(Duration::from_secs(5)))
    }

    #[test]
    fn test_isolated_target_has_only_itself() {
        let store = MemoryStore::new();
        add_transaction(&store, 1, 0.5, 1.5, &[]);

        let sub = extractor().extract(&store, &context(1, 0.5, 1.5), 30).unwrap();
        assert!(sub.edge_views.is_empty());
        assert!(sub.category_embeddings.is_empty());
        let targets = &sub.raw_features[TARGET_TYPE];
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[&LocalId::Numeric(1)], vec![0.5, 1.5]);
    }

    #[test]
    fn test_shared_card_links_transactions() {
        let store = MemoryStore::new();
        add_transaction(&store, 3, 3.0, 0.0, &[("card1", "4000")]);
        add_transaction(&store, 2, 2.0, 0.0, &[("card1", "4000"), ("addr1", "10")]);
        add_transaction(&store, 1, 1.0, 0.0, &[("card1", "4000"), ("addr1", "10")]);

        let sub = extractor().extract(&store, &context(1, 1.0, 0.0), 30).unwrap();

        let (src, dst) = &sub.edge_views["target<>card1"];
        assert_eq!(src, &vec![LocalId::Numeric(1), LocalId::Numeric(2), LocalId::Numeric(3)]);
        assert_eq!(dst, &vec![LocalId::Numeric(4000); 3]);
        let (src, _) = &sub.edge_views["target<>addr1"];
        assert_eq!(src, &vec![LocalId::Numeric(1), LocalId::Numeric(2)]);

        let targets = &sub.raw_features[TARGET_TYPE];
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[&LocalId::Numeric(3)], vec![3.0, 0.0]);
        assert_eq!(
            sub.category_embeddings["card1"][&LocalId::Numeric(4000)],
            vec![0.0; WIDTH]
        );
        assert!(sub.report.dropped.is_empty());
        assert!(sub.report.traversal_calls > 0);
    }

    #[test]
    fn test_zero_fanout_keeps_only_target() {
        let store = MemoryStore::new();
        add_transaction(&store, 2, 2.0, 0.0, &[("card1", "4000")]);
        add_transaction(&store, 1, 1.0, 0.0, &[("card1", "4000")]);

        let sub = extractor().extract(&store, &context(1, 1.0, 0.0), 0).unwrap();
        let (src, dst) = &sub.edge_views["target<>card1"];
        assert_eq!(src, &vec![LocalId::Numeric(1)]);
        assert_eq!(dst.len(), 1);
        assert_eq!(sub.raw_features[TARGET_TYPE].len(), 1);
    }

    #[test]
    fn test_malformed_neighbor_is_dropped_and_pruned() {
        let store = MemoryStore::new();
        add_transaction(&store, 2, 2.0, 0.0, &[("card1", "4000")]);
        add_transaction(&store, 1, 1.0, 0.0, &[("card1", "4000")]);
        store.replace_node(Node::new(NodeId::target(2)).with_payload("{broken"));

        let sub = extractor().extract(&store, &context(1, 1.0, 0.0), 30).unwrap();
        assert_eq!(sub.report.dropped, vec![NodeId::target(2)]);
        assert!(!sub.raw_features[TARGET_TYPE].contains_key(&LocalId::Numeric(2)));
        let (src, dst) = &sub.edge_views["target<>card1"];
        assert_eq!(src, &vec![LocalId::Numeric(1)]);
        assert_eq!(dst.len(), 1);
    }

    #[test]
    fn test_target_features_come_from_context() {
        let store = MemoryStore::new();
        add_transaction(&store, 1, 9.0, 9.0, &[("card1", "4000")]);

        let sub = extractor().extract(&store, &context(1, 1.0, 2.0), 30).unwrap();
        assert_eq!(sub.raw_features[TARGET_TYPE][&LocalId::Numeric(1)], vec![1.0, 2.0]);
    }

    #[test]
    fn test_load_context_from_store() {
        let store = MemoryStore::new();
        add_transaction(&store, 1, 1.0, 2.0, &[("card1", "4000"), ("DeviceType", "mobile")]);

        let ctx = TargetContext::load(&store, &NodeId::target(1), &["card1".to_string()]).unwrap();
        assert_eq!(ctx.feature_columns, columns());
        assert_eq!(ctx.features, vec![1.0, 2.0]);
        assert_eq!(ctx.identifier_columns, vec!["card1", "DeviceType"]);
    }

    #[test]
    fn test_n_feats_merges_categories() {
        let store = MemoryStore::new();
        add_transaction(&store, 1, 1.0, 0.0, &[("card1", "4000")]);
        let sub = extractor().extract(&store, &context(1, 1.0, 0.0), 30).unwrap();

        let n_feats = sub.n_feats();
        assert_eq!(n_feats.len(), 2);
        assert!(n_feats.contains_key("card1"));
        assert!(n_feats.contains_key(TARGET_TYPE));
    }

    /// Logs the limit passed to, and rows returned by, each neighbors call
    struct LimitLog {
        inner: MemoryStore,
        calls: Mutex<Vec<(NodeId, Option<usize>, usize)>>,
    }

    impl GraphStore for LimitLog {
        fn exists_node(&self, id: &NodeId) -> StorageResult<bool> {
            self.inner.exists_node(id)
        }

        fn exists_edge(&self, id: &EdgeId) -> StorageResult<bool> {
            self.inner.exists_edge(id)
        }

        fn create_node(&self, node: &Node) -> StorageResult<()> {
            self.inner.create_node(node)
        }

        fn create_edge(&self, edge: &Edge) -> StorageResult<()> {
            self.inner.create_edge(edge)
        }

        fn neighbors(
            &self,
            id: &NodeId,
            direction: Direction,
            label: Option<&str>,
            limit: Option<usize>,
        ) -> StorageResult<Vec<NodeId>> {
            let found = self.inner.neighbors(id, direction, label, limit)?;
            self.calls
                .lock()
                .unwrap()
                .push((id.clone(), limit, found.len()));
            Ok(found)
        }

        fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
            self.inner.get_node(id)
        }
    }

    #[test]
    fn test_popular_category_is_read_with_fanout_cap() {
        let inner = MemoryStore::new();
        for id in 1..=500 {
            add_transaction(&inner, id, id as f32, 0.0, &[("ProductCD", "W")]);
        }
        let store = LimitLog {
            inner,
            calls: Mutex::new(Vec::new()),
        };
        let target = TargetContext {
            identifier_columns: vec!["ProductCD".into()],
            ..context(1, 1.0, 0.0)
        };

        let sub = extractor().extract(&store, &target, 3).unwrap();
        assert_eq!(sub.edge_views["target<>ProductCD"].0.len(), 3);

        let hub = NodeId::new("ProductCD", "W");
        let calls = store.calls.lock().unwrap();
        let hub_calls: Vec<_> = calls.iter().filter(|(id, _, _)| *id == hub).collect();
        // one from the edge views, one from the neighborhood
        assert_eq!(hub_calls.len(), 2);
        for (_, limit, rows) in hub_calls {
            assert_eq!(*limit, Some(3));
            assert!(*rows <= 3);
        }
    }
}
