//! Queue messages
//!
//! Envelope shared by the intake and result channels, and the per-message
//! batch response every stage returns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed message body: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        MessageError::Malformed(err.to_string())
    }
}

/// A message as delivered by a channel.
///
/// `body` is either a JSON-encoded string or an already-parsed JSON value;
/// [`Envelope::decode`] accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn new(id: impl Into<String>, body: serde_json::Value) -> Self {
        Self { id: id.into(), body }
    }

    /// Envelope whose body is raw JSON text
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, serde_json::Value::String(text.into()))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        match &self.body {
            serde_json::Value::String(text) => Ok(serde_json::from_str(text)?),
            value => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Result of consuming one batch: the ids to redeliver.
/// Every id not listed is considered consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn from_failures<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            batch_item_failures: ids
                .into_iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.into(),
                })
                .collect(),
        }
    }

    /// Mark every envelope of the batch as failed
    pub fn all_failed(batch: &[Envelope]) -> Self {
        Self::from_failures(batch.iter().map(|e| e.id.clone()))
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }
}
