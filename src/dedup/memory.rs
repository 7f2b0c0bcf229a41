//! In-memory ledger

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{DedupError, DedupLedger};

/// Ledger kept in process memory. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct MemoryDedupLedger {
    entries: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl MemoryDedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DedupLedger for MemoryDedupLedger {
    async fn seen(&self, comment_id: &str) -> Result<bool, DedupError> {
        Ok(self.entries.lock().await.contains_key(comment_id))
    }

    async fn mark_seen(&self, comment_id: &str) -> Result<(), DedupError> {
        self.entries
            .lock()
            .await
            .entry(comment_id.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }
}
