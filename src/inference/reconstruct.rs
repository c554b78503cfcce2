//! Graph reconstructor: edge views to a dense, typed heterogeneous graph.
//!
//! Each node type gets a bijection from its sorted local ids onto
//! `0..count`. The feature tensors are built by iterating the same sorted
//! ids, so row `i` of a type's tensor belongs to dense id `i`.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use thiserror::Error;

use crate::graph::{LocalId, TARGET_TYPE};
use crate::model::FeatureStats;

use super::extractor::{relation_name, EdgeViews, FeatureTable, RELATION_SEPARATOR};

/// Relation linking every target node to itself
pub const SELF_RELATION: &str = "self_relation";

/// Errors building the dense graph
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("no feature vector for {node_type} node {local_id}")]
    MissingFeature { node_type: String, local_id: LocalId },

    #[error("target {0} not present in reconstructed graph")]
    TargetNotFound(LocalId),

    #[error("relation '{0}' is not of the form <src>{sep}<dst>", sep = RELATION_SEPARATOR)]
    MalformedRelation(String),

    #[error("relation '{relation}' has {sources} sources but {destinations} destinations")]
    RaggedRelation {
        relation: String,
        sources: usize,
        destinations: usize,
    },

    #[error("{node_type} features have width {found}, expected {expected}")]
    FeatureWidth {
        node_type: String,
        expected: usize,
        found: usize,
    },
}

/// One typed, directed edge set in dense ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub src_type: String,
    pub name: String,
    pub dst_type: String,
    pub src: Vec<usize>,
    pub dst: Vec<usize>,
}

/// Dense heterogeneous graph: node counts per type and typed relations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeteroGraph {
    pub num_nodes: BTreeMap<String, usize>,
    /// Keyed by relation name
    pub relations: BTreeMap<String, Relation>,
}

impl HeteroGraph {
    pub fn num_nodes(&self, node_type: &str) -> usize {
        self.num_nodes.get(node_type).copied().unwrap_or(0)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    fn add(&mut self, relation: Relation) {
        self.relations.insert(relation.name.clone(), relation);
    }
}

/// Output of [`build`]
#[derive(Debug, Clone)]
pub struct DenseGraph {
    pub graph: HeteroGraph,
    /// Per-type feature tensors, rows in dense id order
    pub features: BTreeMap<String, Array2<f32>>,
    pub target: usize,
    /// Sorted local ids per type; position is the dense id
    pub local_ids: BTreeMap<String, Vec<LocalId>>,
}

fn split_relation(name: &str) -> Result<(&str, &str), ReconstructError> {
    name.split_once(RELATION_SEPARATOR)
        .filter(|(s, d)| !s.is_empty() && !d.is_empty())
        .ok_or_else(|| ReconstructError::MalformedRelation(name.to_string()))
}

fn remap(ids: &[LocalId], sorted: &[LocalId]) -> Vec<usize> {
    // every id was inserted into `sorted`, so the search always hits
    ids.iter()
        .map(|id| sorted.binary_search(id).unwrap_or_else(|pos| pos))
        .collect()
}

/// Build the dense graph, feature tensors and dense target id
pub fn build(
    edge_views: &EdgeViews,
    n_feats: &FeatureTable,
    target_local_id: &LocalId,
    stats: &FeatureStats,
) -> Result<DenseGraph, ReconstructError> {
    // 1. local ids per type
    let mut ids: BTreeMap<String, BTreeSet<LocalId>> = BTreeMap::new();
    ids.entry(TARGET_TYPE.to_string())
        .or_default()
        .insert(target_local_id.clone());
    for (name, (sources, destinations)) in edge_views {
        let (src_type, dst_type) = split_relation(name)?;
        if sources.len() != destinations.len() {
            return Err(ReconstructError::RaggedRelation {
                relation: name.clone(),
                sources: sources.len(),
                destinations: destinations.len(),
            });
        }
        ids.entry(src_type.to_string())
            .or_default()
            .extend(sources.iter().cloned());
        ids.entry(dst_type.to_string())
            .or_default()
            .extend(destinations.iter().cloned());
    }

    // 2. sorted bijection per type
    let local_ids: BTreeMap<String, Vec<LocalId>> = ids
        .into_iter()
        .map(|(ntype, set)| (ntype, set.into_iter().collect()))
        .collect();

    let mut graph = HeteroGraph {
        num_nodes: local_ids
            .iter()
            .map(|(ntype, sorted)| (ntype.clone(), sorted.len()))
            .collect(),
        relations: BTreeMap::new(),
    };

    // 3. forward and reverse relations
    for (name, (sources, destinations)) in edge_views {
        let (src_type, dst_type) = split_relation(name)?;
        let src = remap(sources, &local_ids[src_type]);
        let dst = remap(destinations, &local_ids[dst_type]);

        graph.add(Relation {
            src_type: src_type.to_string(),
            name: relation_name(src_type, dst_type),
            dst_type: dst_type.to_string(),
            src: src.clone(),
            dst: dst.clone(),
        });
        graph.add(Relation {
            src_type: dst_type.to_string(),
            name: relation_name(dst_type, src_type),
            dst_type: src_type.to_string(),
            src: dst,
            dst: src,
        });
    }

    // 4. target self-loop
    let targets = &local_ids[TARGET_TYPE];
    let all: Vec<usize> = (0..targets.len()).collect();
    graph.add(Relation {
        src_type: TARGET_TYPE.to_string(),
        name: SELF_RELATION.to_string(),
        dst_type: TARGET_TYPE.to_string(),
        src: all.clone(),
        dst: all,
    });

    // 5. dense target id
    let target = targets
        .binary_search(target_local_id)
        .map_err(|_| ReconstructError::TargetNotFound(target_local_id.clone()))?;

    // 6. feature tensors in dense id order
    let mut features = BTreeMap::new();
    for (ntype, sorted) in &local_ids {
        let table = n_feats.get(ntype);
        let mut rows: Vec<&Vec<f32>> = Vec::with_capacity(sorted.len());
        for id in sorted {
            let row = table.and_then(|t| t.get(id)).ok_or_else(|| {
                ReconstructError::MissingFeature {
                    node_type: ntype.clone(),
                    local_id: id.clone(),
                }
            })?;
            rows.push(row);
        }

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut tensor = Array2::<f32>::zeros((rows.len(), width));
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ReconstructError::FeatureWidth {
                    node_type: ntype.clone(),
                    expected: width,
                    found: row.len(),
                });
            }
            tensor.row_mut(i).assign(&ndarray::ArrayView1::from(row.as_slice()));
        }

        // 7. only the target type is normalized
        if ntype == TARGET_TYPE {
            if stats.width() != width {
                return Err(ReconstructError::FeatureWidth {
                    node_type: ntype.clone(),
                    expected: stats.width(),
                    found: width,
                });
            }
            tensor = stats.normalize(&tensor);
        }
        features.insert(ntype.clone(), tensor);
    }

    tracing::debug!(
        node_types = graph.num_nodes.len(),
        relations = graph.relations.len(),
        target,
        "reconstructed dense graph"
    );

    Ok(DenseGraph {
        graph,
        features,
        target,
        local_ids,
    })
}
