//! PostgreSQL queue
//!
//! Messages live in `queue_messages`. Receiving claims rows with
//! `FOR UPDATE SKIP LOCKED` and pushes `visible_at` forward, so concurrent
//! workers never receive the same message inside one visibility window.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Envelope;

use super::{MessageQueue, QueueError};

#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
    name: String,
    visibility_timeout: Duration,
}

impl PgQueue {
    pub fn new(pool: PgPool, name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            name: name.into(),
            visibility_timeout,
        }
    }

    /// Messages waiting in this queue, visible or not
    pub async fn depth(&self) -> Result<i64, QueueError> {
        let depth: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM queue_messages WHERE queue = $1
            "#,
        )
        .bind(&self.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(depth)
    }
}

#[async_trait]
impl MessageQueue for PgQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO queue_messages (queue, body)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&self.name)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.to_string())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Envelope>, QueueError> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            UPDATE queue_messages
            SET
                visible_at = NOW() + make_interval(secs => $3),
                receive_count = receive_count + 1
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND visible_at <= NOW()
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body
            "#,
        )
        .bind(&self.name)
        .bind(max as i64)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, body)| Envelope::from_text(id.to_string(), body))
            .collect())
    }

    async fn ack(&self, ids: &[String]) -> Result<(), QueueError> {
        let ids: Vec<Uuid> = ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            DELETE FROM queue_messages
            WHERE queue = $1 AND id = ANY($2)
            "#,
        )
        .bind(&self.name)
        .bind(&ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
