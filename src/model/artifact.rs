//! Model artifacts: trained parameters plus the graph metadata they were
//! trained against.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::TARGET_TYPE;
use crate::inference::{relation_name, SELF_RELATION};

use super::error::ModelError;
use super::rgcn::{HeteroRgcn, HeteroRgcnLayer, Linear};

/// Number of output classes
pub const OUT_SIZE: usize = 2;

/// Per-column normalization statistics of target features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl FeatureStats {
    /// Zero standard deviations are replaced with 1.0
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        let std = std
            .into_iter()
            .map(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s })
            .collect::<Vec<_>>();
        Self {
            mean: Array1::from(mean),
            std: Array1::from(std),
        }
    }

    /// Column mean and population standard deviation of a feature matrix
    pub fn fit(features: &Array2<f32>) -> Self {
        let cols = features.ncols();
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(cols));
        let std = features.std_axis(Axis(0), 0.0);
        Self::new(mean.to_vec(), std.to_vec())
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f32> {
        &self.std
    }

    /// `(x - mean) / std` applied row-wise
    pub fn normalize(&self, features: &Array2<f32>) -> Array2<f32> {
        (features - &self.mean) / &self.std
    }
}

/// Graph facts recorded at training time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Relation names the layers carry weights for
    pub etypes: Vec<String>,
    /// Node count per type in the training graph
    pub ntype_cnt: BTreeMap<String, usize>,
    pub feat_mean: Vec<f32>,
    pub feat_std: Vec<f32>,
}

impl GraphMetadata {
    /// Metadata for a graph whose relations link the given type pairs.
    ///
    /// Each pair contributes its forward and reverse relation; the target
    /// self-loop is always present.
    pub fn for_relations(pairs: &[(String, String)], input_size: usize) -> Self {
        let mut etypes = Vec::with_capacity(pairs.len() * 2 + 1);
        let mut ntype_cnt = BTreeMap::new();
        ntype_cnt.insert(TARGET_TYPE.to_string(), 0);
        for (src, dst) in pairs {
            for name in [relation_name(src, dst), relation_name(dst, src)] {
                if !etypes.contains(&name) {
                    etypes.push(name);
                }
            }
            ntype_cnt.entry(src.clone()).or_insert(0);
            ntype_cnt.entry(dst.clone()).or_insert(0);
        }
        etypes.push(SELF_RELATION.to_string());

        Self {
            etypes,
            ntype_cnt,
            feat_mean: vec![0.0; input_size],
            feat_std: vec![1.0; input_size],
        }
    }

    pub fn stats(&self) -> FeatureStats {
        FeatureStats::new(self.feat_mean.clone(), self.feat_std.clone())
    }

    pub fn with_stats(mut self, stats: &FeatureStats) -> Self {
        self.feat_mean = stats.mean().to_vec();
        self.feat_std = stats.std().to_vec();
        self
    }
}

/// Serialized model: metadata, per-layer relation weights, classifier and
/// the training-time embedding tables of non-target types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: GraphMetadata,
    pub input_size: usize,
    pub hidden_size: usize,
    pub layers: Vec<BTreeMap<String, Linear>>,
    pub output: Linear,
    #[serde(default)]
    pub embeddings: BTreeMap<String, Array2<f32>>,
}

fn xavier_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let bound = (6.0 / (rows + cols).max(1) as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-bound..bound))
}

fn check_shape(what: String, expected: &[usize], found: &[usize]) -> Result<(), ModelError> {
    if expected != found {
        return Err(ModelError::Shape {
            what,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

impl ModelArtifact {
    /// Randomly initialized artifact with Xavier-uniform weights
    pub fn initialize<R: Rng>(
        metadata: GraphMetadata,
        input_size: usize,
        hidden_size: usize,
        n_layers: usize,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(n_layers);
        for i in 0..n_layers {
            let in_size = if i == 0 { input_size } else { hidden_size };
            let weights = metadata
                .etypes
                .iter()
                .map(|name| {
                    let linear = Linear::new(
                        xavier_uniform(hidden_size, in_size, rng),
                        Array1::zeros(hidden_size),
                    );
                    (name.clone(), linear)
                })
                .collect();
            layers.push(weights);
        }

        let output = Linear::new(xavier_uniform(OUT_SIZE, hidden_size, rng), Array1::zeros(OUT_SIZE));

        let embeddings = metadata
            .ntype_cnt
            .iter()
            .filter(|(ntype, &count)| ntype.as_str() != TARGET_TYPE && count > 0)
            .map(|(ntype, &count)| (ntype.clone(), xavier_uniform(count, input_size, rng)))
            .collect();

        Self {
            metadata,
            input_size,
            hidden_size,
            layers,
            output,
            embeddings,
        }
    }

    /// Check every parameter against the declared sizes
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::NoLayers);
        }
        check_shape(
            "feat_mean".into(),
            &[self.input_size],
            &[self.metadata.feat_mean.len()],
        )?;
        check_shape(
            "feat_std".into(),
            &[self.input_size],
            &[self.metadata.feat_std.len()],
        )?;

        for (i, layer) in self.layers.iter().enumerate() {
            let in_size = if i == 0 { self.input_size } else { self.hidden_size };
            for etype in &self.metadata.etypes {
                let linear = layer
                    .get(etype)
                    .ok_or_else(|| ModelError::UnknownRelation(format!("{} (layer {})", etype, i)))?;
                check_shape(
                    format!("layer {} '{}' weight", i, etype),
                    &[self.hidden_size, in_size],
                    linear.weight.shape(),
                )?;
                check_shape(
                    format!("layer {} '{}' bias", i, etype),
                    &[self.hidden_size],
                    linear.bias.shape(),
                )?;
            }
        }

        check_shape(
            "output weight".into(),
            &[OUT_SIZE, self.hidden_size],
            self.output.weight.shape(),
        )?;
        check_shape("output bias".into(), &[OUT_SIZE], self.output.bias.shape())?;

        for (ntype, table) in &self.embeddings {
            check_shape(
                format!("'{}' embedding", ntype),
                &[table.nrows(), self.input_size],
                table.shape(),
            )?;
        }
        Ok(())
    }

    /// Load and validate an artifact file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn to_model(&self) -> HeteroRgcn {
        HeteroRgcn::new(
            self.layers
                .iter()
                .map(|weights| HeteroRgcnLayer::new(weights.clone()))
                .collect(),
            self.output.clone(),
        )
    }
}
