//! Scheduled Jobs
//!
//! Periodic extraction and snapshot cycles. Snapshots also run whenever
//! the extractor requests one through the trigger channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::extractor::{ExtractReport, Extractor};
use crate::snapshot::{SnapshotReport, SnapshotRequest, Snapshotter};

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between extraction cycles (default: 5 minutes)
    pub extract_interval: Duration,
    /// Interval between scheduled snapshots (default: 1 hour)
    pub snapshot_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            extract_interval: Duration::from_secs(300),
            snapshot_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - drives the extractor and snapshotter
pub struct JobScheduler {
    extractor: Extractor,
    snapshotter: Snapshotter,
    requests: Option<mpsc::Receiver<SnapshotRequest>>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(extractor: Extractor, snapshotter: Snapshotter) -> Self {
        Self::with_config(extractor, snapshotter, JobSchedulerConfig::default())
    }

    pub fn with_config(
        extractor: Extractor,
        snapshotter: Snapshotter,
        config: JobSchedulerConfig,
    ) -> Self {
        Self {
            extractor,
            snapshotter,
            requests: None,
            config,
        }
    }

    /// Run a snapshot for every request received on `requests`
    pub fn with_requests(mut self, requests: mpsc::Receiver<SnapshotRequest>) -> Self {
        self.requests = Some(requests);
        self
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        tracing::info!("Job scheduler started");

        let mut extract_interval = interval(self.config.extract_interval);
        let mut snapshot_interval = interval(self.config.snapshot_interval);
        // The first snapshot tick fires immediately; skip it
        snapshot_interval.tick().await;

        let mut requests = self.requests.take();

        loop {
            tokio::select! {
                _ = extract_interval.tick() => {
                    if let Err(e) = self.extractor.run_cycle().await {
                        tracing::error!(error = %e, "Extraction cycle failed");
                    }
                }
                _ = snapshot_interval.tick() => {
                    self.snapshot().await;
                }
                Some(request) = next_request(&mut requests) => {
                    tracing::debug!(
                        source = %request.source,
                        requested_at = %request.requested_at,
                        "Snapshot requested"
                    );
                    self.snapshot().await;
                }
            }
        }
    }

    async fn snapshot(&self) {
        if let Err(e) = self.snapshotter.run().await {
            tracing::error!(error = %e, "Snapshot cycle failed");
        }
    }

    /// Run one extraction and one snapshot (for manual trigger or testing)
    pub async fn run_all_once(&self) -> JobReport {
        let mut report = JobReport::default();

        match self.extractor.run_cycle().await {
            Ok(extract) => report.extract = Some(extract),
            Err(e) => report.errors.push(format!("Extraction: {}", e)),
        }

        match self.snapshotter.run().await {
            Ok(snapshot) => report.snapshot = Some(snapshot),
            Err(e) => report.errors.push(format!("Snapshot: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Next trigger request; pends forever once the channel is gone
async fn next_request(
    requests: &mut Option<mpsc::Receiver<SnapshotRequest>>,
) -> Option<SnapshotRequest> {
    match requests {
        Some(receiver) => match receiver.recv().await {
            Some(request) => Some(request),
            None => {
                *requests = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}

/// Report from running every job once
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub extract: Option<ExtractReport>,
    pub snapshot: Option<SnapshotReport>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}
