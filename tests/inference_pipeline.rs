//! End-to-end behavior of the inference path over the in-memory store
//!
//! Run with: `cargo test --test inference_pipeline`

mod common;

use std::sync::Arc;

use common::{config, local_endpoint, memory_sink, pipeline, record, transaction, FailingSink};
use fraudgraph::inference::{normalize_event, TargetContext};
use fraudgraph::{
    Edge, GraphStore, InferenceError, InferencePipeline, LocalId, MemoryStore, MockEndpoint, Node,
    NodeId,
};
use serde_json::json;

fn ids(values: &[i64]) -> Vec<LocalId> {
    values.iter().map(|v| LocalId::Numeric(*v)).collect()
}

// ============================================================================
// Scoring and emission
// ============================================================================

#[tokio::test]
async fn test_scores_and_emits_one_decision() {
    let store = MemoryStore::new();
    let sink = memory_sink();
    let p = pipeline(Arc::new(store.clone()), local_endpoint(7), sink.clone());

    let outcome = p
        .handle_inference_request(&transaction(5001, 100.0, "4000", "100"), None)
        .await
        .unwrap();

    assert_eq!(outcome.id, LocalId::Numeric(5001));
    assert!((0.0..=1.0).contains(&outcome.probability));
    assert_eq!(outcome.is_fraud, outcome.probability > 0.9);
    assert_eq!(outcome.dropped_nodes, 0);

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, LocalId::Numeric(5001));
    assert_eq!(messages[0].is_fraud, outcome.is_fraud);
    assert_eq!(messages[0].card1, json!("4000"));
    assert_eq!(messages[0].product_cd, json!("W"));
}

#[tokio::test]
async fn test_threshold_is_strict() {
    let store = MemoryStore::new();
    let at = pipeline(Arc::new(store.clone()), Arc::new(MockEndpoint::returning(0.9)), memory_sink());
    let above = pipeline(Arc::new(store), Arc::new(MockEndpoint::returning(0.95)), memory_sink());

    let tx = transaction(1, 10.0, "4000", "100");
    assert!(!at.handle_inference_request(&tx, None).await.unwrap().is_fraud);
    assert!(above.handle_inference_request(&tx, None).await.unwrap().is_fraud);
}

#[tokio::test]
async fn test_repeated_request_is_deterministic_and_idempotent() {
    let store = MemoryStore::new();
    let p = pipeline(Arc::new(store.clone()), local_endpoint(7), memory_sink());
    let tx = transaction(5001, 100.0, "4000", "100");

    let first = p.handle_inference_request(&tx, None).await.unwrap();
    // target, card1-4000, addr1-100, ProductCD-W
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.edge_count(), 3);

    let second = p.handle_inference_request(&tx, None).await.unwrap();
    assert_eq!(first.probability, second.probability);
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.edge_count(), 3);
}

#[tokio::test]
async fn test_same_seed_same_probability() {
    let tx = transaction(5001, 100.0, "4000", "100");
    let a = pipeline(Arc::new(MemoryStore::new()), local_endpoint(11), memory_sink());
    let b = pipeline(Arc::new(MemoryStore::new()), local_endpoint(11), memory_sink());

    let pa = a.handle_inference_request(&tx, None).await.unwrap().probability;
    let pb = b.handle_inference_request(&tx, None).await.unwrap().probability;
    assert_eq!(pa, pb);
}

// ============================================================================
// Graph shape seen by the scorer
// ============================================================================

#[tokio::test]
async fn test_shared_categories_link_transactions() {
    let store = MemoryStore::new();
    let mock = Arc::new(MockEndpoint::returning(0.1));
    let p = pipeline(Arc::new(store.clone()), mock.clone(), memory_sink());

    p.handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap();
    p.handle_inference_request(&transaction(2, 20.0, "4000", "200"), None)
        .await
        .unwrap();

    let request = mock.last_request().unwrap();
    assert_eq!(request.target_id, LocalId::Numeric(2));

    let (sources, destinations) = &request.graph["target<>card1"];
    assert_eq!(sources, &ids(&[1, 2]));
    assert_eq!(destinations, &ids(&[4000, 4000]));

    let (sources, _) = &request.graph["target<>addr1"];
    assert_eq!(sources, &ids(&[2]));

    let targets = &request.n_feats["target"];
    assert_eq!(targets.keys().cloned().collect::<Vec<_>>(), ids(&[1, 2]));
    assert_eq!(request.n_feats["card1"][&LocalId::Numeric(4000)], vec![0.0; 3]);
}

#[tokio::test]
async fn test_isolated_target_scores_alone() {
    let store = MemoryStore::new();
    let mock = Arc::new(MockEndpoint::returning(0.2));
    let tx = record(json!({"TransactionID": 7, "TransactionAmt": 10.0, "C1": 0.0}));

    let p = pipeline(Arc::new(store.clone()), mock.clone(), memory_sink());
    p.handle_inference_request(&tx, None).await.unwrap();

    let request = mock.last_request().unwrap();
    assert!(request.graph.is_empty());
    assert_eq!(request.n_feats.len(), 1);
    assert_eq!(request.n_feats["target"][&LocalId::Numeric(7)], vec![1.0, 0.0, 0.0]);

    let local = pipeline(Arc::new(store), local_endpoint(3), memory_sink());
    let outcome = local.handle_inference_request(&tx, None).await.unwrap();
    assert!((0.0..=1.0).contains(&outcome.probability));
}

#[tokio::test]
async fn test_zero_fanout_keeps_only_the_target() {
    let store = MemoryStore::new();
    let mock = Arc::new(MockEndpoint::returning(0.1));
    let cfg = fraudgraph::PipelineConfig {
        max_fanout: 0,
        ..config()
    };
    let p = InferencePipeline::new(cfg, Arc::new(store.clone()), mock.clone(), memory_sink());

    p.handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap();
    p.handle_inference_request(&transaction(2, 20.0, "4000", "100"), None)
        .await
        .unwrap();

    let request = mock.last_request().unwrap();
    assert_eq!(request.graph["target<>card1"].0, ids(&[2]));
    assert_eq!(request.n_feats["target"].len(), 1);
}

#[tokio::test]
async fn test_malformed_neighbor_is_dropped() {
    let store = MemoryStore::new();
    let mock = Arc::new(MockEndpoint::returning(0.1));
    let p = pipeline(Arc::new(store.clone()), mock.clone(), memory_sink());

    p.handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap();

    let broken = NodeId::target(9);
    store
        .create_node(&Node::new(broken.clone()).with_payload("not json"))
        .unwrap();
    store
        .create_edge(&Edge::new(broken, NodeId::new("card1", "4000"), "card1"))
        .unwrap();

    let outcome = p
        .handle_inference_request(&transaction(2, 20.0, "4000", "100"), None)
        .await
        .unwrap();
    assert_eq!(outcome.dropped_nodes, 1);

    let request = mock.last_request().unwrap();
    assert_eq!(request.graph["target<>card1"].0, ids(&[1, 2]));
    assert!(!request.n_feats["target"].contains_key(&LocalId::Numeric(9)));
}

#[tokio::test]
async fn test_stored_payload_round_trips() {
    let store = MemoryStore::new();
    let p = pipeline(Arc::new(store.clone()), Arc::new(MockEndpoint::returning(0.1)), memory_sink());
    let tx = transaction(5001, 100.0, "4000", "100");

    p.handle_inference_request(&tx, None).await.unwrap();

    let cfg = config();
    let event = normalize_event(&tx, None, &cfg).unwrap();
    let loaded = TargetContext::load(&store, &event.node_id, &cfg.identifier_columns).unwrap();

    assert_eq!(loaded.feature_columns, vec!["TransactionAmt", "C1", "Pr_W"]);
    assert_eq!(loaded.features, event.features);
    assert_eq!(loaded.features, vec![2.0, 1.0, 1.0]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_category_node() {
    let store = MemoryStore::new();
    let p = Arc::new(pipeline(
        Arc::new(store.clone()),
        Arc::new(MockEndpoint::returning(0.1)),
        memory_sink(),
    ));

    let mut handles = Vec::new();
    for id in 100..108 {
        let p = p.clone();
        let tx = transaction(id, 10.0, "4000", &id.to_string());
        handles.push(tokio::spawn(async move {
            p.handle_inference_request(&tx, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(store.exists_node(&NodeId::new("card1", "4000")).unwrap());
    // 8 targets, 8 addr1 values, card1-4000, ProductCD-W
    assert_eq!(store.node_count(), 18);
    assert_eq!(store.edge_count(), 24);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_scoring_failure_emits_nothing() {
    let store = MemoryStore::new();
    let sink = memory_sink();
    let p = pipeline(Arc::new(store.clone()), Arc::new(MockEndpoint::failing()), sink.clone());

    let err = p
        .handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, InferenceError::ScoringUnavailable(_)));
    assert!(err.is_retryable());
    assert!(sink.messages().is_empty());
    // Mutation is not rolled back
    assert!(store.exists_node(&NodeId::target(1)).unwrap());
}

#[tokio::test]
async fn test_sink_failure_keeps_outcome() {
    let p = pipeline(
        Arc::new(MemoryStore::new()),
        Arc::new(MockEndpoint::returning(0.95)),
        Arc::new(FailingSink),
    );

    let outcome = p
        .handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap();
    assert!(outcome.is_fraud);
}

#[tokio::test]
async fn test_invalid_request_touches_nothing() {
    let store = MemoryStore::new();
    let mock = Arc::new(MockEndpoint::returning(0.1));
    let p = pipeline(Arc::new(store.clone()), mock.clone(), memory_sink());

    let tx = record(json!({"TransactionID": 1, "card1": "4000"}));
    let err = p.handle_inference_request(&tx, None).await.unwrap_err();

    assert!(matches!(err, InferenceError::MissingField(ref f) if f == "TransactionAmt"));
    assert!(err.is_client_error());
    assert_eq!(mock.calls(), 0);
    assert_eq!(store.node_count(), 0);
}

#[tokio::test]
async fn test_relation_unknown_to_model_is_rejected() {
    let p = pipeline(Arc::new(MemoryStore::new()), local_endpoint(7), memory_sink());
    let identity = record(json!({"TransactionID": 1, "DeviceType": "mobile"}));

    let err = p
        .handle_inference_request(&transaction(1, 10.0, "4000", "100"), Some(&identity))
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::ModelRejected(_)));
    assert!(!err.is_retryable());
}
