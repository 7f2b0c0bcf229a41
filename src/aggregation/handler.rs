//! Aggregator stage: result queue in, topic aggregates out

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::dedup::{already_seen, record_seen, DedupLedger};
use crate::domain::{BatchResponse, EnrichedComment, Envelope, MessageError};
use crate::queue::BatchHandler;

use super::{partition, Aggregator};

pub struct AggregateHandler {
    aggregator: Aggregator,
    ledger: Arc<dyn DedupLedger>,
}

impl AggregateHandler {
    pub fn new(aggregator: Aggregator, ledger: Arc<dyn DedupLedger>) -> Self {
        Self { aggregator, ledger }
    }
}

/// Why the remaining topic groups of a batch were not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    DeadlinePassed,
    StoreUnavailable,
}

fn decode(envelope: &Envelope) -> Result<EnrichedComment, MessageError> {
    let record: EnrichedComment = envelope.decode()?;
    record.validate()?;
    Ok(record)
}

#[async_trait]
impl BatchHandler for AggregateHandler {
    async fn handle(&self, batch: &[Envelope], deadline: Instant) -> BatchResponse {
        let mut failures: Vec<String> = Vec::new();
        let mut accepted: Vec<(&str, EnrichedComment)> = Vec::new();
        let mut batch_ids: HashSet<String> = HashSet::new();
        let mut skipped = 0usize;

        for envelope in batch {
            let record = match decode(envelope) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(message_id = %envelope.id, error = %e, "Rejecting enriched comment");
                    failures.push(envelope.id.clone());
                    continue;
                }
            };

            if !batch_ids.insert(record.comment_id.clone())
                || already_seen(self.ledger.as_ref(), &record.comment_id).await
            {
                tracing::debug!(comment_id = %record.comment_id, "Comment already counted, skipping");
                skipped += 1;
                continue;
            }

            accepted.push((envelope.id.as_str(), record));
        }

        let mut committed = 0usize;
        let mut halted: Option<Halt> = None;

        for (topic_id, group) in partition(accepted, |(_, record)| record.topic_id.as_str()) {
            // Only checked between topics: a topic that started writing is finished
            if halted.is_none() && Instant::now() >= deadline {
                halted = Some(Halt::DeadlinePassed);
            }
            if let Some(reason) = halted {
                tracing::warn!(
                    topic_id = %topic_id,
                    records = group.len(),
                    ?reason,
                    "Leaving topic for redelivery"
                );
                failures.extend(group.iter().map(|(id, _)| id.to_string()));
                continue;
            }

            match self
                .aggregator
                .apply(&topic_id, group.iter().map(|(_, record)| record))
                .await
            {
                Ok(_) => {
                    committed += 1;
                    for (_, record) in &group {
                        record_seen(self.ledger.as_ref(), &record.comment_id).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        topic_id = %topic_id,
                        records = group.len(),
                        error = %e,
                        "Failed to update topic aggregate"
                    );
                    failures.extend(group.iter().map(|(id, _)| id.to_string()));
                    if e.is_unavailable() {
                        halted = Some(Halt::StoreUnavailable);
                    }
                }
            }
        }

        if halted == Some(Halt::StoreUnavailable) && committed == 0 {
            tracing::error!(
                received = batch.len(),
                "Aggregate store unreachable, failing the whole batch"
            );
            return BatchResponse::all_failed(batch);
        }

        tracing::info!(
            received = batch.len(),
            skipped,
            failed = failures.len(),
            "Aggregated batch"
        );
        BatchResponse::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::MemoryDedupLedger;
    use crate::domain::{AggregateDelta, LanguageHistogram, TopicAggregate};
    use crate::queue::{MemoryQueue, MessageQueue, QueueWorker, WorkerConfig};
    use crate::store::{AddOutcome, AggregateStore, MemoryStore, StoreError};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn body(comment_id: &str, topic: &str, sentiment: f64, toxic: f64) -> String {
        json!({
            "comment_id": comment_id,
            "post_id": topic,
            "comment_text": "text",
            "timestamp": 1700000000,
            "language": "en",
            "sentiment_score": sentiment,
            "toxic_score": toxic,
            "processed_status": "COMPLETED",
            "metadata": {}
        })
        .to_string()
    }

    fn envelope(id: &str, comment_id: &str, topic: &str, sentiment: f64, toxic: f64) -> Envelope {
        Envelope::from_text(id, body(comment_id, topic, sentiment, toxic))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn handler(store: &MemoryStore, ledger: &MemoryDedupLedger) -> AggregateHandler {
        AggregateHandler::new(
            Aggregator::new(Arc::new(store.clone())),
            Arc::new(ledger.clone()),
        )
    }

    /// Rejects every add for one topic
    struct FailingTopic {
        topic_id: String,
        inner: MemoryStore,
    }

    #[async_trait]
    impl AggregateStore for FailingTopic {
        async fn add_totals(
            &self,
            topic_id: &str,
            delta: &AggregateDelta,
        ) -> Result<AddOutcome, StoreError> {
            if topic_id == self.topic_id {
                return Err(StoreError::InitializationConflict(topic_id.to_string()));
            }
            self.inner.add_totals(topic_id, delta).await
        }

        async fn initialize(&self, aggregate: &TopicAggregate) -> Result<bool, StoreError> {
            self.inner.initialize(aggregate).await
        }

        async fn derive_averages(
            &self,
            topic_id: &str,
            last_updated: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.derive_averages(topic_id, last_updated).await
        }

        async fn merge_languages(
            &self,
            topic_id: &str,
            languages: &LanguageHistogram,
        ) -> Result<(), StoreError> {
            self.inner.merge_languages(topic_id, languages).await
        }

        async fn get_aggregate(&self, topic_id: &str) -> Result<Option<TopicAggregate>, StoreError> {
            self.inner.get_aggregate(topic_id).await
        }

        async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError> {
            self.inner.scan_aggregates().await
        }
    }

    #[tokio::test]
    async fn test_malformed_message_is_the_only_failure() {
        let store = MemoryStore::new();
        let ledger = MemoryDedupLedger::new();

        let batch = vec![
            envelope("m1", "c1", "T", 6.0, 2.0),
            envelope("m2", "c2", "T", 8.0, 0.0),
            Envelope::from_text("m3", "{\"comment_id\": \"c3\", \"post_id\""),
            envelope("m4", "c4", "T", 4.0, 0.0),
            envelope("m5", "c5", "U", 2.0, 6.0),
        ];
        let response = handler(&store, &ledger).handle(&batch, far_deadline()).await;

        assert_eq!(response.failed_ids(), vec!["m3"]);

        let t = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(t.total_comments, 3);
        assert_eq!(t.sentiment_sum, dec!(18));
        assert_eq!(t.average_sentiment, dec!(6));
        let u = store.get_aggregate("U").await.unwrap().unwrap();
        assert_eq!(u.total_comments, 1);
        assert_eq!(ledger.len().await, 4);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_rejected() {
        let store = MemoryStore::new();
        let batch = vec![envelope("m1", "c1", "T", 12.0, 0.0)];

        let response = handler(&store, &MemoryDedupLedger::new()).handle(&batch, far_deadline()).await;
        assert_eq!(response.failed_ids(), vec!["m1"]);
        assert!(store.get_aggregate("T").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redelivered_comment_counted_once() {
        let store = MemoryStore::new();
        let ledger = MemoryDedupLedger::new();
        let handler = handler(&store, &ledger);

        let batch = vec![
            envelope("m1", "c1", "T", 6.0, 2.0),
            envelope("m2", "c1", "T", 6.0, 2.0),
        ];
        assert!(handler.handle(&batch, far_deadline()).await.is_success());
        assert!(handler
            .handle(&[envelope("m3", "c1", "T", 6.0, 2.0)], far_deadline())
            .await
            .is_success());

        let aggregate = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(aggregate.total_comments, 1);
    }

    #[tokio::test]
    async fn test_store_failure_reports_whole_topic() {
        let store = MemoryStore::new();
        let ledger = MemoryDedupLedger::new();
        let handler = AggregateHandler::new(
            Aggregator::new(Arc::new(FailingTopic {
                topic_id: "A".to_string(),
                inner: store.clone(),
            })),
            Arc::new(ledger.clone()),
        );

        let batch = vec![
            envelope("m1", "c1", "A", 6.0, 0.0),
            envelope("m2", "c2", "B", 6.0, 0.0),
            envelope("m3", "c3", "A", 6.0, 0.0),
        ];
        let response = handler.handle(&batch, far_deadline()).await;

        assert_eq!(response.failed_ids(), vec!["m1", "m3"]);
        assert!(store.get_aggregate("B").await.unwrap().is_some());
        assert!(!ledger.seen("c1").await.unwrap());
        assert!(ledger.seen("c2").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = MemoryStore::new();
        let response = handler(&store, &MemoryDedupLedger::new()).handle(&[], far_deadline()).await;
        assert!(response.is_success());
        assert!(store.scan_aggregates().await.unwrap().is_empty());
    }

    /// Memory store whose derive step is slow
    struct SlowDerive {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl AggregateStore for SlowDerive {
        async fn add_totals(
            &self,
            topic_id: &str,
            delta: &AggregateDelta,
        ) -> Result<AddOutcome, StoreError> {
            self.inner.add_totals(topic_id, delta).await
        }

        async fn initialize(&self, aggregate: &TopicAggregate) -> Result<bool, StoreError> {
            self.inner.initialize(aggregate).await
        }

        async fn derive_averages(
            &self,
            topic_id: &str,
            last_updated: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.derive_averages(topic_id, last_updated).await
        }

        async fn merge_languages(
            &self,
            topic_id: &str,
            languages: &LanguageHistogram,
        ) -> Result<(), StoreError> {
            self.inner.merge_languages(topic_id, languages).await
        }

        async fn get_aggregate(&self, topic_id: &str) -> Result<Option<TopicAggregate>, StoreError> {
            self.inner.get_aggregate(topic_id).await
        }

        async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError> {
            self.inner.scan_aggregates().await
        }
    }

    /// Every call fails as if the database were down
    struct Unreachable;

    #[async_trait]
    impl AggregateStore for Unreachable {
        async fn add_totals(
            &self,
            _topic_id: &str,
            _delta: &AggregateDelta,
        ) -> Result<AddOutcome, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn initialize(&self, _aggregate: &TopicAggregate) -> Result<bool, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn derive_averages(
            &self,
            _topic_id: &str,
            _last_updated: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn merge_languages(
            &self,
            _topic_id: &str,
            _languages: &LanguageHistogram,
        ) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn get_aggregate(&self, _topic_id: &str) -> Result<Option<TopicAggregate>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_topic_past_deadline_finishes_and_is_not_recounted() {
        let store = MemoryStore::new();
        let ledger = MemoryDedupLedger::new();
        let handler = Arc::new(AggregateHandler::new(
            Aggregator::new(Arc::new(SlowDerive {
                inner: store.clone(),
                delay: Duration::from_millis(100),
            })),
            Arc::new(ledger.clone()),
        ));

        let results = MemoryQueue::new("results", Duration::from_secs(30));
        let worker = QueueWorker::with_config(
            Arc::new(results.clone()),
            handler,
            WorkerConfig {
                deadline: Duration::from_millis(20),
                ..Default::default()
            },
        );

        results.send(&body("c0", "T", 6.0, 2.0)).await.unwrap();
        worker.poll_once().await.unwrap();

        // The derive step outlives the deadline; the topic still completes
        results.send(&body("c1", "T", 8.0, 0.0)).await.unwrap();
        let report = worker.poll_once().await.unwrap();
        assert!(report.timed_out);
        assert_eq!(report.consumed, 1);
        assert!(results.is_empty().await);

        let aggregate = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(aggregate.total_comments, 2);
        assert_eq!(aggregate.sentiment_sum, dec!(14));
        assert_eq!(aggregate.average_sentiment, dec!(7));
        assert_eq!(aggregate.average_toxic, dec!(1));
        assert_eq!(aggregate.language_distribution.get("en"), Some(&2));
        assert!(ledger.seen("c1").await.unwrap());

        // A late redelivery of the same comment changes nothing
        results.send(&body("c1", "T", 8.0, 0.0)).await.unwrap();
        worker.poll_once().await.unwrap();

        let aggregate = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(aggregate.total_comments, 2);
        assert_eq!(aggregate.average_sentiment, dec!(7));
    }

    #[tokio::test]
    async fn test_topics_not_started_before_deadline_are_redelivered() {
        let store = MemoryStore::new();
        let ledger = MemoryDedupLedger::new();

        let batch = vec![
            envelope("m1", "c1", "A", 6.0, 0.0),
            envelope("m2", "c2", "B", 6.0, 0.0),
        ];
        let response = handler(&store, &ledger).handle(&batch, Instant::now()).await;

        assert_eq!(response.failed_ids(), vec!["m1", "m2"]);
        assert!(store.scan_aggregates().await.unwrap().is_empty());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_whole_batch() {
        let ledger = MemoryDedupLedger::new();
        let handler = AggregateHandler::new(
            Aggregator::new(Arc::new(Unreachable)),
            Arc::new(ledger.clone()),
        );

        let batch = vec![
            envelope("m1", "c1", "A", 6.0, 0.0),
            Envelope::from_text("m2", "{broken"),
            envelope("m3", "c3", "B", 6.0, 0.0),
        ];
        let response = handler.handle(&batch, far_deadline()).await;

        assert_eq!(response.failed_ids(), vec!["m1", "m2", "m3"]);
        assert!(ledger.is_empty().await);
    }
}
