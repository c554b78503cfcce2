//! Scoring endpoints
//!
//! The pipeline hands a `ScoringRequest` to a `ScoringEndpoint` and gets
//! back the fraud probability. Three implementations:
//! - `LocalEndpoint`: reconstructs and scores in process
//! - `HttpEndpoint`: POSTs the request as JSON to a remote scorer
//! - `MockEndpoint`: returns a preconfigured probability (testing)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::graph::LocalId;
use crate::inference::{EdgeViews, FeatureTable};

use super::context::ModelContext;
use super::error::ScoringError;

/// Wire document sent to a scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub graph: EdgeViews,
    /// Transaction features and category embeddings by node type
    pub n_feats: FeatureTable,
    pub target_id: LocalId,
}

/// Anything that turns a scoring request into a probability
#[async_trait]
pub trait ScoringEndpoint: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn score(&self, request: &ScoringRequest) -> Result<f32, ScoringError>;
}

/// In-process scorer over a loaded model
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    context: Arc<ModelContext>,
}

impl LocalEndpoint {
    pub fn new(context: Arc<ModelContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ScoringEndpoint for LocalEndpoint {
    fn name(&self) -> &str {
        "local"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<f32, ScoringError> {
        self.context.score(request)
    }
}

/// Remote scorer reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Read a scorer response body: a bare JSON number
pub fn parse_probability(body: &str) -> Result<f32, ScoringError> {
    let value: serde_json::Value = serde_json::from_str(body.trim())
        .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;
    let p = value
        .as_f64()
        .ok_or_else(|| ScoringError::InvalidResponse(format!("expected a number, got {}", value)))?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ScoringError::InvalidResponse(format!(
            "probability {} is outside [0, 1]",
            p
        )));
    }
    Ok(p as f32)
}

#[async_trait]
impl ScoringEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.url
    }

    async fn score(&self, request: &ScoringRequest) -> Result<f32, ScoringError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_probability(&body)
    }
}

/// Mock scorer for testing: fixed probability or failure, records requests
#[derive(Debug)]
pub struct MockEndpoint {
    probability: Option<f32>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ScoringRequest>>,
}

impl MockEndpoint {
    /// A mock that always returns `probability`
    pub fn returning(probability: f32) -> Self {
        Self {
            probability: Some(probability),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always fails as unavailable
    pub fn failing() -> Self {
        Self {
            probability: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ScoringRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl ScoringEndpoint for MockEndpoint {
    fn name(&self) -> &str {
        "mock"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<f32, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        self.probability.ok_or_else(|| {
            ScoringError::Unavailable("mock endpoint configured as failing".to_string())
        })
    }
}
