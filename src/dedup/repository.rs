//! Dedup Ledger Repository
//!
//! PostgreSQL-backed ledger. One table holds every scope.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{DedupError, DedupLedger, LedgerScope};

/// Ledger rows live in `dedup_ledger`, keyed by `(scope, comment_id)`
#[derive(Debug, Clone)]
pub struct PgDedupLedger {
    pool: PgPool,
    scope: LedgerScope,
}

impl PgDedupLedger {
    pub fn new(pool: PgPool, scope: LedgerScope) -> Self {
        Self { pool, scope }
    }

    /// Number of ids recorded for this scope
    pub async fn count(&self) -> Result<i64, DedupError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM dedup_ledger WHERE scope = $1
            "#,
        )
        .bind(self.scope.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl DedupLedger for PgDedupLedger {
    async fn seen(&self, comment_id: &str) -> Result<bool, DedupError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM dedup_ledger
                WHERE scope = $1 AND comment_id = $2
            )
            "#,
        )
        .bind(self.scope.as_str())
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn mark_seen(&self, comment_id: &str) -> Result<(), DedupError> {
        // Never updated once written; the first processed_at wins
        sqlx::query(
            r#"
            INSERT INTO dedup_ledger (scope, comment_id, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (scope, comment_id) DO NOTHING
            "#,
        )
        .bind(self.scope.as_str())
        .bind(comment_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(comment_id, scope = %self.scope, "Marked comment as processed");
        Ok(())
    }
}
