//! In-memory store
//!
//! Same semantics as the PostgreSQL store, with a single lock standing in
//! for row locks. Intended for tests and local runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    merge_histogram, AggregateDelta, HistoryEntry, LanguageHistogram, TopicAggregate,
    TopicMetadata,
};

use super::{AddOutcome, AggregateStore, HistoryStore, StoreError, TopicStore};

#[derive(Debug, Default)]
struct Inner {
    topics: BTreeMap<String, TopicMetadata>,
    aggregates: BTreeMap<String, TopicAggregate>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
}

/// Cloneable handle to a shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn add_totals(
        &self,
        topic_id: &str,
        delta: &AggregateDelta,
    ) -> Result<AddOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(aggregate) = inner.aggregates.get_mut(topic_id) else {
            return Ok(AddOutcome::Missing);
        };

        aggregate.total_comments += delta.count;
        aggregate.sentiment_sum += delta.sentiment_sum;
        aggregate.toxic_sum += delta.toxic_sum;
        Ok(AddOutcome::Updated(aggregate.totals()))
    }

    async fn initialize(&self, aggregate: &TopicAggregate) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.aggregates.contains_key(&aggregate.topic_id) {
            return Ok(false);
        }
        inner
            .aggregates
            .insert(aggregate.topic_id.clone(), aggregate.clone());
        Ok(true)
    }

    async fn derive_averages(
        &self,
        topic_id: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(aggregate) = inner.aggregates.get_mut(topic_id) {
            if let Some((average_sentiment, average_toxic)) = aggregate.totals().averages() {
                aggregate.average_sentiment = average_sentiment;
                aggregate.average_toxic = average_toxic;
                aggregate.last_updated = last_updated;
            }
        }
        Ok(())
    }

    async fn merge_languages(
        &self,
        topic_id: &str,
        languages: &LanguageHistogram,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(aggregate) = inner.aggregates.get_mut(topic_id) {
            merge_histogram(&mut aggregate.language_distribution, languages);
        }
        Ok(())
    }

    async fn get_aggregate(&self, topic_id: &str) -> Result<Option<TopicAggregate>, StoreError> {
        Ok(self.inner.lock().await.aggregates.get(topic_id).cloned())
    }

    async fn scan_aggregates(&self) -> Result<Vec<TopicAggregate>, StoreError> {
        Ok(self.inner.lock().await.aggregates.values().cloned().collect())
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn upsert_topic(&self, topic: &TopicMetadata) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .topics
            .insert(topic.topic_id.clone(), topic.clone());
        Ok(())
    }

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicMetadata>, StoreError> {
        Ok(self.inner.lock().await.topics.get(topic_id).cloned())
    }

    async fn list_topics(&self) -> Result<Vec<TopicMetadata>, StoreError> {
        Ok(self.inner.lock().await.topics.values().cloned().collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entries = inner.history.entry(entry.topic_id.clone()).or_default();
        if !entries.iter().any(|e| e.last_updated == entry.last_updated) {
            entries.push(entry.clone());
            entries.sort_by_key(|e| e.last_updated);
        }
        Ok(())
    }

    async fn history(&self, topic_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .history
            .get(topic_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Comment, EnrichedComment, Scores};
    use rust_decimal_macros::dec;

    fn record(language: &str, sentiment: f64, toxic: f64) -> EnrichedComment {
        Comment::new("c", "T", "text").enrich(Scores {
            language: language.to_string(),
            sentiment_score: sentiment,
            toxic_score: toxic,
        })
    }

    #[tokio::test]
    async fn test_add_on_missing_topic_is_distinguishable() {
        let store = MemoryStore::new();
        let delta = AggregateDelta::from_records(&[record("en", 6.0, 2.0)]);

        let outcome = store.add_totals("T", &delta).await.unwrap();
        assert_eq!(outcome, AddOutcome::Missing);
        assert!(store.get_aggregate("T").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let store = MemoryStore::new();
        let delta = AggregateDelta::from_records(&[record("en", 6.0, 2.0)]);
        let aggregate = TopicAggregate::initial("T", &delta, Utc::now()).unwrap();

        assert!(store.initialize(&aggregate).await.unwrap());
        assert!(!store.initialize(&aggregate).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_then_derive() {
        let store = MemoryStore::new();
        let first = AggregateDelta::from_records(&[record("en", 6.0, 2.0)]);
        store
            .initialize(&TopicAggregate::initial("T", &first, Utc::now()).unwrap())
            .await
            .unwrap();

        let second = AggregateDelta::from_records(&[record("vi", 8.0, 0.0)]);
        let outcome = store.add_totals("T", &second).await.unwrap();
        let AddOutcome::Updated(totals) = outcome else {
            panic!("expected update");
        };
        assert_eq!(totals.total_comments, 2);

        // Averages lag the sums until the derive step runs
        let stale = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(stale.sentiment_sum, dec!(14));
        assert_eq!(stale.average_sentiment, dec!(6));

        store.derive_averages("T", Utc::now()).await.unwrap();
        store.merge_languages("T", &second.languages).await.unwrap();

        let settled = store.get_aggregate("T").await.unwrap().unwrap();
        assert_eq!(settled.average_sentiment, dec!(7));
        assert_eq!(settled.average_toxic, dec!(1));
        assert_eq!(settled.language_distribution.get("vi"), Some(&1));
    }

    #[tokio::test]
    async fn test_history_ordered_and_deduplicated() {
        let store = MemoryStore::new();
        let later = Utc::now();
        let earlier = later - chrono::Duration::minutes(5);

        for at in [later, earlier, later] {
            store
                .append_history(&HistoryEntry {
                    topic_id: "T".to_string(),
                    last_updated: at,
                    average_sentiment: dec!(5),
                    total_comments: 1,
                })
                .await
                .unwrap();
        }

        let entries = store.history("T").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].last_updated, earlier);
        assert!(store.history("missing").await.unwrap().is_empty());
    }
}
