//! Fire-and-forget snapshot requests
//!
//! The extractor asks for a snapshot after a productive cycle. The request
//! is delivered after a short delay so the scorer and aggregator get a head
//! start; nothing waits for it and a dropped request is only logged.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event type carried by every snapshot request
pub const SNAPSHOT_DETAIL_TYPE: &str = "SaveHistory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    pub source: String,
    pub detail_type: String,
    pub requested_at: DateTime<Utc>,
}

impl SnapshotRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            detail_type: SNAPSHOT_DETAIL_TYPE.to_string(),
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotTrigger {
    sender: mpsc::Sender<SnapshotRequest>,
    delay: Duration,
}

impl SnapshotTrigger {
    /// Create a trigger and the receiving end consumed by the scheduler
    pub fn channel(delay: Duration, capacity: usize) -> (Self, mpsc::Receiver<SnapshotRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, delay }, receiver)
    }

    /// Schedule a request without waiting for it
    pub fn request(&self, source: &str) {
        let sender = self.sender.clone();
        let delay = self.delay;
        let request = SnapshotRequest::new(source);

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = sender.try_send(request) {
                tracing::warn!(error = %e, "Snapshot trigger failed, next scheduled snapshot will catch up");
            }
        });
    }
}
