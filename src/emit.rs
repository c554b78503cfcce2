//! Downstream decision queue
//!
//! Decisions are fire-and-forget: the pipeline sends one message per scored
//! transaction and never reads back.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::graph::LocalId;
use crate::inference::Record;

/// Errors delivering a decision
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Message published for every scored transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMessage {
    /// Unix seconds
    pub timestamp: i64,
    pub is_fraud: bool,
    pub id: LocalId,
    pub amount: Value,
    #[serde(rename = "productCD")]
    pub product_cd: Value,
    pub card1: Value,
    pub card2: Value,
    pub card3: Value,
    pub card4: Value,
    pub card5: Value,
    pub card6: Value,
    pub addr1: Value,
    pub addr2: Value,
    pub dist1: Value,
    pub dist2: Value,
    pub p_emaildomain: Value,
    pub r_emaildomain: Value,
    pub request_id: Uuid,
}

impl DecisionMessage {
    /// Build from the inbound transaction record; absent fields become null
    pub fn from_transaction(id: LocalId, is_fraud: bool, transaction: &Record) -> Self {
        let field = |key: &str| transaction.get(key).cloned().unwrap_or(Value::Null);
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            is_fraud,
            id,
            amount: field("TransactionAmt"),
            product_cd: field("ProductCD"),
            card1: field("card1"),
            card2: field("card2"),
            card3: field("card3"),
            card4: field("card4"),
            card5: field("card5"),
            card6: field("card6"),
            addr1: field("addr1"),
            addr2: field("addr2"),
            dist1: field("dist1"),
            dist2: field("dist2"),
            p_emaildomain: field("P_emaildomain"),
            r_emaildomain: field("R_emaildomain"),
            request_id: Uuid::new_v4(),
        }
    }
}

/// A downstream queue accepting decision messages
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn send(&self, message: &DecisionMessage) -> Result<(), SinkError>;
}

/// Appends one JSON document per line to a file, or to stdout
#[derive(Debug, Clone, Default)]
pub struct JsonLinesSink {
    path: Option<PathBuf>,
}

impl JsonLinesSink {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn stdout() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl DecisionSink for JsonLinesSink {
    async fn send(&self, message: &DecisionMessage) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        match &self.path {
            Some(path) => {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
            }
            None => {
                let mut out = tokio::io::stdout();
                out.write_all(&line).await?;
                out.flush().await?;
            }
        }
        Ok(())
    }
}

/// Collects messages in memory (testing)
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<DecisionMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<DecisionMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DecisionSink for MemorySink {
    async fn send(&self, message: &DecisionMessage) -> Result<(), SinkError> {
        self.messages
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}
