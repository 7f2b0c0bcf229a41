//! Queue Worker
//!
//! Polls a queue, hands each batch to a stage and acknowledges everything
//! the stage did not report as failed. Failed messages, including those the
//! stage did not reach before its deadline, are left alone and come back
//! after the visibility timeout. The stage itself is never cancelled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant};

use super::{BatchHandler, MessageQueue, QueueError};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum messages per batch (default: 10)
    pub batch_size: usize,
    /// Delay between polls (default: 1 second)
    pub poll_interval: Duration,
    /// Time budget for one batch; work not started past it is redelivered
    pub deadline: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(1),
            deadline: Duration::from_secs(30),
        }
    }
}

/// Outcome of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub consumed: usize,
    pub failed: usize,
    /// The stage finished after its deadline
    pub timed_out: bool,
}

pub struct QueueWorker {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn BatchHandler>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn MessageQueue>, handler: Arc<dyn BatchHandler>) -> Self {
        Self::with_config(queue, handler, WorkerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn BatchHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Receive and process a single batch
    pub async fn poll_once(&self) -> Result<PollReport, QueueError> {
        let batch = self.queue.receive(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(PollReport::default());
        }

        let deadline = Instant::now() + self.config.deadline;
        let response = self.handler.handle(&batch, deadline).await;
        let timed_out = Instant::now() >= deadline;

        let failed: HashSet<&str> = response.failed_ids().into_iter().collect();
        let consumed: Vec<String> = batch
            .iter()
            .filter(|e| !failed.contains(e.id.as_str()))
            .map(|e| e.id.clone())
            .collect();

        self.queue.ack(&consumed).await?;

        let report = PollReport {
            received: batch.len(),
            consumed: consumed.len(),
            failed: batch.len() - consumed.len(),
            timed_out,
        };

        if report.timed_out {
            tracing::warn!(
                queue = self.queue.name(),
                batch_size = batch.len(),
                failed = report.failed,
                "Batch ran past its deadline"
            );
        } else if report.failed > 0 {
            tracing::warn!(
                queue = self.queue.name(),
                consumed = report.consumed,
                failed = report.failed,
                "Batch processed with failures"
            );
        } else {
            tracing::debug!(
                queue = self.queue.name(),
                consumed = report.consumed,
                "Batch processed"
            );
        }

        Ok(report)
    }

    /// Poll until a receive comes back empty, summing the reports
    pub async fn drain(&self) -> Result<PollReport, QueueError> {
        let mut total = PollReport::default();
        loop {
            let report = self.poll_once().await?;
            if report.received == 0 {
                return Ok(total);
            }
            total.received += report.received;
            total.consumed += report.consumed;
            total.failed += report.failed;
            total.timed_out |= report.timed_out;
        }
    }

    /// Start polling in the background
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(queue = self.queue.name(), "Queue worker started");

        let mut ticker = interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                tracing::error!(queue = self.queue.name(), error = %e, "Queue poll failed");
            }
        }
    }
}
