//! PostgreSQL store
//!
//! Additive updates rely on single-statement `UPDATE ... RETURNING`, which
//! takes the row lock and serializes concurrent adds on the same topic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::{
    AggregateDelta, HistoryEntry, LanguageHistogram, TopicAggregate, TopicMetadata, Totals,
};

use super::{AddOutcome, AggregateStore, HistoryStore, StoreError, TopicStore};

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn languages_for(&self, topic_id: &str) -> Result<LanguageHistogram, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT language, count FROM topic_language_counts
            WHERE topic_id = $1
            "#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

/// Decode one `topic_aggregates` row
fn aggregate_from_row(row: &PgRow) -> Result<TopicAggregate, StoreError> {
    let topic_id: String = row.try_get("topic_id")?;
    let malformed = |reason: String| StoreError::MalformedRow {
        topic_id: topic_id.clone(),
        reason,
    };

    let total_comments: i64 = row
        .try_get("total_comments")
        .map_err(|e| malformed(e.to_string()))?;
    if total_comments <= 0 {
        return Err(malformed(format!("total_comments = {}", total_comments)));
    }

    Ok(TopicAggregate {
        topic_id: topic_id.clone(),
        total_comments,
        sentiment_sum: row
            .try_get("sentiment_sum")
            .map_err(|e| malformed(e.to_string()))?,
        toxic_sum: row
            .try_get("toxic_sum")
            .map_err(|e| malformed(e.to_string()))?,
        average_sentiment: row
            .try_get("average_sentiment")
            .map_err(|e| malformed(e.to_string()))?,
        average_toxic: row
            .try_get("average_toxic")
            .map_err(|e| malformed(e.to_string()))?,
        language_distribution: LanguageHistogram::new(),
        last_updated: row
            .try_get("last_updated")
            .map_err(|e| malformed(e.to_string()))?,
    })
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn add_totals(
        &self,
        topic_id: &str,
        delta: &AggregateDelta,
    ) -> Result<AddOutcome, StoreError> {
        let updated: Option<(i64, Decimal, Decimal)> = sqlx::query_as(
            r#"
            UPDATE topic_aggregates
            SET
                total_comments = total_comments + $2,
                sentiment_sum = sentiment_sum + $3,
                toxic_sum = toxic_sum + $4
            WHERE topic_id = $1
            RETURNING total_comments, sentiment_sum, toxic_sum
            "#,
        )
        .bind(topic_id)
        .bind(delta.count)
        .bind(delta.sentiment_sum)
        .bind(delta.toxic_sum)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match updated {
            Some((total_comments, sentiment_sum, toxic_sum)) => AddOutcome::Updated(Totals {
                total_comments,
                sentiment_sum,
                toxic_sum,
            }),
            None => AddOutcome::Missing,
        })
    }

    async fn initialize(&self, aggregate: &TopicAggregate) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO topic_aggregates (
                topic_id, total_comments, sentiment_sum, toxic_sum,
                average_sentiment, average_toxic, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (topic_id) DO NOTHING
            "#,
        )
        .bind(&aggregate.topic_id)
        .bind(aggregate.total_comments)
        .bind(aggregate.sentiment_sum)
        .bind(aggregate.toxic_sum)
        .bind(aggregate.average_sentiment)
        .bind(aggregate.average_toxic)
        .bind(aggregate.last_updated)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (language, count) in &aggregate.language_distribution {
            sqlx::query(
                r#"
                INSERT INTO topic_language_counts (topic_id, language, count)
                VALUES ($1, $2, $3)
                ON CONFLICT (topic_id, language)
                DO UPDATE SET count = topic_language_counts.count + EXCLUDED.count
                "#,
            )
            .bind(&aggregate.topic_id)
            .bind(language)
            .bind(*count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn derive_averages(
        &self,
        topic_id: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE topic_aggregates
            SET
                average_sentiment = sentiment_sum / total_comments,
                average_toxic = toxic_sum / total_comments,
                last_updated = $2
            WHERE topic_id = $1 AND total_comments > 0
            "#,
        )
        .bind(topic_id)
        .bind(last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn merge_languages(
        &self,
        topic_id: &str,
        languages: &LanguageHistogram,
    ) -> Result<(), StoreError> {
        if languages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (language, count) in languages {
            sqlx::query(
                r#"
                INSERT INTO topic_language_counts (topic_id, language, count)
                VALUES ($1, $2, $3)
                ON CONFLICT (topic_id, language)
                DO UPDATE SET count = topic_language_counts.count + EXCLUDED.count
                "#,
            )
            .bind(topic_id)
            .bind(language)
            .bind(*count)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn get_aggregate(&self, topic_id: &str) -> Result<Option<TopicAggregate>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT topic_id, total_comments, sentiment_sum, toxic_sum,
                   average_sentiment, average_toxic, last_updated
            FROM topic_aggregates
            WHERE topic_id = $1
            "#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut aggregate = aggregate_from_row(&row)?;
        aggregate.language_distribution = self.languages_for(topic_id).await?;
        Ok(Some(aggregate))
    }

    async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT topic_id, total_comments, sentiment_sum, toxic_sum,
                   average_sentiment, average_toxic, last_updated
            FROM topic_aggregates
            ORDER BY topic_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let language_rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT topic_id, language, count FROM topic_language_counts
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut aggregates = BTreeMap::new();
        for row in &rows {
            match aggregate_from_row(row) {
                Ok(aggregate) => {
                    aggregates.insert(aggregate.topic_id.clone(), aggregate);
                }
                Err(e) => tracing::error!(error = %e, "Skipping undecodable aggregate row"),
            }
        }

        // Languages of skipped rows are dropped with them
        for (topic_id, language, count) in language_rows {
            if let Some(aggregate) = aggregates.get_mut(&topic_id) {
                aggregate.language_distribution.insert(language, count);
            }
        }

        Ok(aggregates.into_values().collect())
    }
}

#[async_trait]
impl TopicStore for PgStore {
    async fn upsert_topic(&self, topic: &TopicMetadata) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO topics (topic_id, content, post_type, media_url, created_time, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (topic_id) DO UPDATE SET
                content = EXCLUDED.content,
                post_type = EXCLUDED.post_type,
                media_url = EXCLUDED.media_url,
                created_time = EXCLUDED.created_time,
                updated_at = NOW()
            "#,
        )
        .bind(&topic.topic_id)
        .bind(&topic.content)
        .bind(&topic.post_type)
        .bind(&topic.media_url)
        .bind(&topic.created_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicMetadata>, StoreError> {
        let topic: Option<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT topic_id, content, post_type, media_url, created_time
            FROM topics
            WHERE topic_id = $1
            "#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(topic.map(
            |(topic_id, content, post_type, media_url, created_time)| TopicMetadata {
                topic_id,
                content,
                post_type,
                media_url,
                created_time,
            },
        ))
    }

    async fn list_topics(&self) -> Result<Vec<TopicMetadata>, StoreError> {
        let topics: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT topic_id, content, post_type, media_url, created_time
            FROM topics
            ORDER BY created_time DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(topics
            .into_iter()
            .map(
                |(topic_id, content, post_type, media_url, created_time)| TopicMetadata {
                    topic_id,
                    content,
                    post_type,
                    media_url,
                    created_time,
                },
            )
            .collect())
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        // An unchanged aggregate yields the same key; the entry is already recorded
        sqlx::query(
            r#"
            INSERT INTO topic_history (topic_id, last_updated, average_sentiment, total_comments)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (topic_id, last_updated) DO NOTHING
            "#,
        )
        .bind(&entry.topic_id)
        .bind(entry.last_updated)
        .bind(entry.average_sentiment)
        .bind(entry.total_comments)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history(&self, topic_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<(String, DateTime<Utc>, Decimal, i64)> = sqlx::query_as(
            r#"
            SELECT topic_id, last_updated, average_sentiment, total_comments
            FROM topic_history
            WHERE topic_id = $1
            ORDER BY last_updated ASC
            "#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(topic_id, last_updated, average_sentiment, total_comments)| HistoryEntry {
                    topic_id,
                    last_updated,
                    average_sentiment,
                    total_comments,
                },
            )
            .collect())
    }
}
