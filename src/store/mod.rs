//! Store module
//!
//! Persistence seams for topic metadata, running aggregates and history.
//! `PgStore` backs production; `MemoryStore` backs tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AggregateDelta, HistoryEntry, LanguageHistogram, TopicAggregate, TopicMetadata, Totals,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed row for topic {topic_id}: {reason}")]
    MalformedRow { topic_id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Aggregate for topic {0} kept changing during initialization")]
    InitializationConflict(String),
}

impl StoreError {
    /// The store could not be reached at all, as opposed to rejecting one write
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

/// Outcome of the additive step on a topic aggregate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddOutcome {
    /// Totals after the add was applied
    Updated(Totals),
    /// No aggregate exists for the topic yet; nothing was written
    Missing,
}

/// Running per-topic aggregates.
///
/// `add_totals` must be atomic per topic: concurrent callers for the same
/// topic never lose each other's increments.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Atomically add a delta's counters and return the new totals
    async fn add_totals(&self, topic_id: &str, delta: &AggregateDelta)
        -> Result<AddOutcome, StoreError>;

    /// Create a topic's first aggregate.
    /// Returns `false` without writing if one already exists.
    async fn initialize(&self, aggregate: &TopicAggregate) -> Result<bool, StoreError>;

    /// Re-read the committed sums and rewrite `average_*` and `last_updated`.
    ///
    /// Reading and writing happen in one step so that a slower worker can
    /// never overwrite averages derived from newer totals. No-op while
    /// `total_comments == 0`.
    async fn derive_averages(
        &self,
        topic_id: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Add per-language counts, creating missing languages at zero
    async fn merge_languages(
        &self,
        topic_id: &str,
        languages: &LanguageHistogram,
    ) -> Result<(), StoreError>;

    async fn get_aggregate(&self, topic_id: &str) -> Result<Option<TopicAggregate>, StoreError>;

    /// Every committed aggregate. Rows that cannot be decoded are skipped.
    async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError>;
}

/// Topic metadata, independent of the aggregate counters
#[async_trait]
pub trait TopicStore: Send + Sync {
    /// Insert or overwrite (last write wins)
    async fn upsert_topic(&self, topic: &TopicMetadata) -> Result<(), StoreError>;

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicMetadata>, StoreError>;

    async fn list_topics(&self) -> Result<Vec<TopicMetadata>, StoreError>;
}

/// Append-only history log
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StoreError>;

    /// Entries for one topic, oldest first
    async fn history(&self, topic_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}
