//! The inference path over a SQLite-backed store
//!
//! Run with: `cargo test --test sqlite_pipeline`

mod common;

use std::sync::Arc;

use common::{config, local_endpoint, memory_sink, pipeline, transaction};
use fraudgraph::inference::{SubgraphExtractor, TargetContext};
use fraudgraph::{GraphStore, LocalId, MemoryStore, NodeId, OpenStore, SqliteConnector, SqliteStore};

#[tokio::test]
async fn test_graph_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let p = pipeline(Arc::new(SqliteConnector::new(&path)), local_endpoint(5), memory_sink());

    p.handle_inference_request(&transaction(1, 10.0, "4000", "100"), None)
        .await
        .unwrap();
    p.handle_inference_request(&transaction(2, 20.0, "4000", "200"), None)
        .await
        .unwrap();

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.exists_node(&NodeId::new("card1", "4000")).unwrap());
    assert!(store.exists_node(&NodeId::target(2)).unwrap());

    let cfg = config();
    let target = TargetContext::load(&store, &NodeId::target(2), &cfg.identifier_columns).unwrap();
    let subgraph = SubgraphExtractor::from_config(&cfg)
        .extract(&store, &target, cfg.max_fanout)
        .unwrap();

    assert_eq!(
        subgraph.edge_views["target<>card1"].0,
        vec![LocalId::Numeric(1), LocalId::Numeric(2)]
    );
    assert_eq!(subgraph.raw_features["target"].len(), 2);
    assert!(subgraph.report.dropped.is_empty());
}

#[tokio::test]
async fn test_backends_agree_on_probability() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = pipeline(
        Arc::new(SqliteConnector::new(dir.path().join("graph.db"))),
        local_endpoint(5),
        memory_sink(),
    );
    let memory = pipeline(Arc::new(MemoryStore::new()), local_endpoint(5), memory_sink());

    let history = [
        transaction(1, 10.0, "4000", "100"),
        transaction(2, 250.0, "4000", "200"),
        transaction(3, 35.5, "5100", "100"),
    ];
    for tx in &history {
        let a = sqlite.handle_inference_request(tx, None).await.unwrap();
        let b = memory.handle_inference_request(tx, None).await.unwrap();
        assert_eq!(a.probability, b.probability);
        assert_eq!(a.is_fraud, b.is_fraud);
    }
}
