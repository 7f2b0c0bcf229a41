//! Snapshotter
//!
//! Copies every committed topic aggregate into the append-only history log.
//! Topics are isolated from each other: one failed write never stops the
//! rest of the cycle.

mod trigger;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::HistoryEntry;
use crate::store::{AggregateStore, HistoryStore, StoreError};

pub use trigger::{SnapshotRequest, SnapshotTrigger, SNAPSHOT_DETAIL_TYPE};

/// Outcome of one snapshot cycle
#[derive(Debug, Clone, Default)]
pub struct SnapshotReport {
    pub written: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct Snapshotter {
    aggregates: Arc<dyn AggregateStore>,
    history: Arc<dyn HistoryStore>,
}

impl Snapshotter {
    pub fn new(aggregates: Arc<dyn AggregateStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            aggregates,
            history,
        }
    }

    /// Append one history entry per aggregate.
    ///
    /// Fails only when the aggregates cannot be listed at all.
    pub async fn run(&self) -> Result<SnapshotReport, StoreError> {
        let aggregates = self.aggregates.scan_aggregates().await?;
        let mut report = SnapshotReport::default();

        for aggregate in &aggregates {
            let entry = HistoryEntry::from(aggregate);
            match self.history.append_history(&entry).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    tracing::error!(
                        topic_id = %aggregate.topic_id,
                        error = %e,
                        "Failed to save history snapshot"
                    );
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{}: {}", aggregate.topic_id, e));
                }
            }
        }

        report.completed_at = Some(Utc::now());
        tracing::info!(
            written = report.written,
            failed = report.failed,
            "Snapshot cycle completed"
        );
        Ok(report)
    }
}
