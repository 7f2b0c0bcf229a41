//! Message queue module
//!
//! The intake and result channels between pipeline stages. Delivery is
//! at-least-once: a received message stays invisible for the visibility
//! timeout and comes back unless it is acknowledged.

mod memory;
mod postgres;
mod worker;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use crate::domain::{BatchResponse, Envelope};

pub use memory::MemoryQueue;
pub use postgres::PgQueue;
pub use worker::{PollReport, QueueWorker, WorkerConfig};

/// Queue name for raw comments
pub const INTAKE_QUEUE: &str = "intake";

/// Queue name for enriched comments
pub const RESULT_QUEUE: &str = "results";

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// A named channel carrying JSON message bodies
#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue a body, returning the new message id
    async fn send(&self, body: &str) -> Result<String, QueueError>;

    /// Take up to `max` visible messages
    async fn receive(&self, max: usize) -> Result<Vec<Envelope>, QueueError>;

    /// Delete consumed messages
    async fn ack(&self, ids: &[String]) -> Result<(), QueueError>;
}

/// Serialize and enqueue a value
pub async fn send_json<T: Serialize + Sync>(
    queue: &dyn MessageQueue,
    value: &T,
) -> Result<String, QueueError> {
    let body = serde_json::to_string(value)?;
    queue.send(&body).await
}

/// A pipeline stage that consumes one batch at a time.
///
/// Implementations report failures per message and never fail the whole
/// call; ids missing from the response are treated as consumed.
///
/// `deadline` is checked between units of work, never inside one: work not
/// started once it has passed is reported failed and comes back through
/// redelivery, while a unit already writing runs to completion.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &[Envelope], deadline: Instant) -> BatchResponse;
}
