//! Heterogeneous relational graph convolution over ndarray

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::graph::TARGET_TYPE;
use crate::inference::HeteroGraph;

use super::error::ModelError;

/// Negative slope of the inter-layer activation
pub const LEAKY_RELU_SLOPE: f32 = 0.01;

/// Per-type node representations
pub type FeatureMap = BTreeMap<String, Array2<f32>>;

/// Affine map `x W^T + b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// `(out, in)`
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    /// Forward pass for a batch of rows
    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if input.ncols() != self.in_features() {
            return Err(ModelError::Shape {
                what: "linear input".into(),
                expected: vec![input.nrows(), self.in_features()],
                found: input.shape().to_vec(),
            });
        }
        Ok(input.dot(&self.weight.t()) + &self.bias)
    }
}

pub fn leaky_relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| if v > 0.0 { v } else { LEAKY_RELU_SLOPE * v })
}

/// Row-wise softmax
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// One R-GCN layer: a linear map per relation name
#[derive(Debug, Clone, PartialEq)]
pub struct HeteroRgcnLayer {
    pub weights: BTreeMap<String, Linear>,
}

impl HeteroRgcnLayer {
    pub fn new(weights: BTreeMap<String, Linear>) -> Self {
        Self { weights }
    }

    /// Message passing step.
    ///
    /// For every relation whose source type has a representation, source
    /// rows are transformed by the relation's weights and averaged per
    /// destination node; the per-relation results are summed. Only types
    /// that receive at least one relation appear in the output.
    pub fn forward(&self, graph: &HeteroGraph, features: &FeatureMap) -> Result<FeatureMap, ModelError> {
        let mut out = FeatureMap::new();

        for relation in graph.relations.values() {
            let Some(h) = features.get(&relation.src_type) else {
                continue;
            };
            let linear = self
                .weights
                .get(&relation.name)
                .ok_or_else(|| ModelError::UnknownRelation(relation.name.clone()))?;
            let wh = linear.forward(h)?;

            let n_dst = graph.num_nodes(&relation.dst_type);
            let mut agg = Array2::<f32>::zeros((n_dst, linear.out_features()));
            let mut degree = vec![0usize; n_dst];
            for (&s, &d) in relation.src.iter().zip(&relation.dst) {
                if s >= wh.nrows() {
                    return Err(ModelError::EdgeOutOfRange {
                        relation: relation.name.clone(),
                        node_type: relation.src_type.clone(),
                        index: s,
                        count: wh.nrows(),
                    });
                }
                if d >= n_dst {
                    return Err(ModelError::EdgeOutOfRange {
                        relation: relation.name.clone(),
                        node_type: relation.dst_type.clone(),
                        index: d,
                        count: n_dst,
                    });
                }
                let mut row = agg.row_mut(d);
                row += &wh.row(s);
                degree[d] += 1;
            }
            // nodes without incoming edges keep a zero message
            for (d, &deg) in degree.iter().enumerate() {
                if deg > 1 {
                    let mut row = agg.row_mut(d);
                    row /= deg as f32;
                }
            }

            match out.get_mut(&relation.dst_type) {
                Some(acc) => *acc += &agg,
                None => {
                    out.insert(relation.dst_type.clone(), agg);
                }
            }
        }

        Ok(out)
    }
}

/// R-GCN stack with a linear classifier on the target type
#[derive(Debug, Clone, PartialEq)]
pub struct HeteroRgcn {
    pub layers: Vec<HeteroRgcnLayer>,
    pub output: Linear,
}

impl HeteroRgcn {
    pub fn new(layers: Vec<HeteroRgcnLayer>, output: Linear) -> Self {
        Self { layers, output }
    }

    /// Class probabilities for every target node
    pub fn forward(&self, graph: &HeteroGraph, features: &FeatureMap) -> Result<Array2<f32>, ModelError> {
        let mut layers = self.layers.iter();
        let first = layers.next().ok_or(ModelError::NoLayers)?;
        let mut h = first.forward(graph, features)?;
        for layer in layers {
            let activated: FeatureMap = h.iter().map(|(k, v)| (k.clone(), leaky_relu(v))).collect();
            h = layer.forward(graph, &activated)?;
        }

        let target = h.get(TARGET_TYPE).ok_or(ModelError::NoTargetRepresentation)?;
        let logits = self.output.forward(target)?;
        Ok(softmax(&logits))
    }

    /// Fraud probability of one target node
    pub fn score(&self, graph: &HeteroGraph, features: &FeatureMap, target: usize) -> Result<f32, ModelError> {
        let probs = self.forward(graph, features)?;
        if target >= probs.nrows() {
            return Err(ModelError::TargetOutOfRange {
                index: target,
                count: probs.nrows(),
            });
        }
        probs.get((target, 1)).copied().ok_or_else(|| ModelError::Shape {
            what: "class probabilities".into(),
            expected: vec![probs.nrows(), 2],
            found: probs.shape().to_vec(),
        })
    }
}
