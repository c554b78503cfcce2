//! Pipeline configuration
//!
//! Loaded from YAML. Every field has a default matching the production
//! deployment, so an absent or partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do with a non-positive transaction amount before taking its log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountPolicy {
    /// Raise the amount to `amount_floor`
    #[default]
    Clamp,
    /// Fail the request with `InvalidInput`
    Reject,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_identifier_columns() -> Vec<String> {
    strings(&[
        "card1",
        "card2",
        "card3",
        "card4",
        "card5",
        "card6",
        "ProductCD",
        "addr1",
        "addr2",
        "P_emaildomain",
        "R_emaildomain",
    ])
}

fn default_categorical_columns() -> Vec<String> {
    (1..=9).map(|i| format!("M{}", i)).collect()
}

fn default_dummy_columns() -> Vec<String> {
    strings(&[
        "M1_F", "M1_T", "M2_F", "M2_T", "M3_F", "M3_T", "M4_M0", "M4_M1", "M4_M2", "M5_F", "M5_T",
        "M6_F", "M6_T", "M7_F", "M7_T", "M8_F", "M8_T", "M9_F", "M9_T",
    ])
}

fn default_separator() -> char {
    '_'
}

fn default_max_fanout() -> usize {
    30
}

fn default_threshold() -> f32 {
    0.9
}

fn default_embedding_width() -> usize {
    390
}

fn default_amount_floor() -> f64 {
    0.01
}

fn default_traversal_timeout_ms() -> u64 {
    5000
}

fn default_scoring_timeout_ms() -> u64 {
    5000
}

fn default_hidden_size() -> usize {
    16
}

fn default_layers() -> usize {
    2
}

/// Configuration for the inference pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Columns that become category nodes instead of features
    pub identifier_columns: Vec<String>,
    /// Categorical columns, represented only through their dummies
    pub categorical_columns: Vec<String>,
    /// One-hot columns, `<source><separator><expected>`
    pub dummy_columns: Vec<String>,
    pub dummy_separator: char,
    /// Neighbors explored per traversal step
    pub max_fanout: usize,
    /// A transaction is fraud when its probability exceeds this
    pub decision_threshold: f32,
    /// Arity of category embedding vectors (`val1..valN`)
    pub embedding_width: usize,
    pub amount_policy: AmountPolicy,
    pub amount_floor: f64,
    pub traversal_timeout_ms: u64,
    /// Per-request timeout of the remote scorer
    pub scoring_timeout_ms: u64,
    /// Hidden width used when initializing a fresh model
    pub hidden_size: usize,
    /// R-GCN layer count used when initializing a fresh model
    pub layers: usize,
    pub store_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    /// Remote scorer; in-process scoring when absent
    pub endpoint_url: Option<String>,
    /// JSON-lines decision file; stdout when absent
    pub queue_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identifier_columns: default_identifier_columns(),
            categorical_columns: default_categorical_columns(),
            dummy_columns: default_dummy_columns(),
            dummy_separator: default_separator(),
            max_fanout: default_max_fanout(),
            decision_threshold: default_threshold(),
            embedding_width: default_embedding_width(),
            amount_policy: AmountPolicy::default(),
            amount_floor: default_amount_floor(),
            traversal_timeout_ms: default_traversal_timeout_ms(),
            scoring_timeout_ms: default_scoring_timeout_ms(),
            hidden_size: default_hidden_size(),
            layers: default_layers(),
            store_path: None,
            model_path: None,
            endpoint_url: None,
            queue_path: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Split a dummy spec into `(source prefix, expected value)`
    pub fn split_dummy<'a>(&self, spec: &'a str) -> Option<(&'a str, &'a str)> {
        spec.split_once(self.dummy_separator)
            .filter(|(prefix, _)| !prefix.is_empty())
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(ConfigError::Invalid(format!(
                "decision_threshold {} is outside [0, 1]",
                self.decision_threshold
            )));
        }
        if self.embedding_width == 0 {
            return Err(ConfigError::Invalid("embedding_width must be positive".into()));
        }
        if self.amount_policy == AmountPolicy::Clamp && self.amount_floor <= 0.0 {
            return Err(ConfigError::Invalid("amount_floor must be positive".into()));
        }
        if self.scoring_timeout_ms == 0 {
            return Err(ConfigError::Invalid("scoring_timeout_ms must be positive".into()));
        }
        if self.layers == 0 {
            return Err(ConfigError::Invalid("layers must be positive".into()));
        }
        if let Some(bad) = self
            .dummy_columns
            .iter()
            .find(|spec| self.split_dummy(spec).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "dummy column '{}' has no '{}' separator",
                bad, self.dummy_separator
            )));
        }
        Ok(())
    }
}
