//! Dedup ledger
//!
//! Write-once membership set of comment ids that already entered a stage.
//! Used as a filter, not a queue: `seen` and `mark_seen` are independent,
//! non-transactional calls and racing duplicates are harmless downstream.

mod memory;
mod repository;

use async_trait::async_trait;

pub use memory::MemoryDedupLedger;
pub use repository::PgDedupLedger;

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Which stage a ledger guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerScope {
    /// Comments already emitted onto the intake channel
    Extracted,
    /// Comments already folded into a topic aggregate
    Aggregated,
}

impl LedgerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerScope::Extracted => "extracted",
            LedgerScope::Aggregated => "aggregated",
        }
    }
}

impl std::fmt::Display for LedgerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership set of processed comment ids.
///
/// Once `mark_seen(id)` succeeded, `seen(id)` is `true` forever. Marking the
/// same id twice stores a single entry.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn seen(&self, comment_id: &str) -> Result<bool, DedupError>;

    async fn mark_seen(&self, comment_id: &str) -> Result<(), DedupError>;
}

/// Existence check that prefers reprocessing over silent drops:
/// a ledger error reads as "not seen".
pub async fn already_seen(ledger: &dyn DedupLedger, comment_id: &str) -> bool {
    match ledger.seen(comment_id).await {
        Ok(seen) => seen,
        Err(e) => {
            tracing::warn!(comment_id, error = %e, "Ledger check failed, treating as unseen");
            false
        }
    }
}

/// Best-effort mark; a failure only means the comment may be reprocessed
pub async fn record_seen(ledger: &dyn DedupLedger, comment_id: &str) -> bool {
    match ledger.mark_seen(comment_id).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(comment_id, error = %e, "Failed to mark comment as processed");
            false
        }
    }
}
