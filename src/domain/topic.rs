//! Topic records
//!
//! Per-topic metadata, running aggregates and history snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::EnrichedComment;

/// Default post type when the source reports no attachment
pub const DEFAULT_POST_TYPE: &str = "status";

/// Descriptive topic fields, upserted by the extractor (last write wins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub topic_id: String,
    pub content: String,
    pub post_type: String,
    pub media_url: String,
    pub created_time: String,
}

/// Per-language comment counts
pub type LanguageHistogram = BTreeMap<String, i64>;

/// Add `delta` counts into `target`, creating missing languages at zero first
pub fn merge_histogram(target: &mut LanguageHistogram, delta: &LanguageHistogram) {
    for (language, count) in delta {
        *target.entry(language.clone()).or_insert(0) += count;
    }
}

/// Additive contribution of one group of records to a topic
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateDelta {
    pub count: i64,
    pub sentiment_sum: Decimal,
    pub toxic_sum: Decimal,
    pub languages: LanguageHistogram,
}

impl AggregateDelta {
    /// Fold a group of records into a single delta
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a EnrichedComment>,
    {
        let mut delta = Self::default();
        for record in records {
            delta.count += 1;
            delta.sentiment_sum += record.sentiment();
            delta.toxic_sum += record.toxicity();
            *delta.languages.entry(record.language.clone()).or_insert(0) += 1;
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// The three additive counters of an aggregate.
///
/// Always mutually consistent: they are only ever changed together by one
/// atomic add.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub total_comments: i64,
    pub sentiment_sum: Decimal,
    pub toxic_sum: Decimal,
}

impl Totals {
    /// `(average_sentiment, average_toxic)`, or `None` while there are no comments
    pub fn averages(&self) -> Option<(Decimal, Decimal)> {
        if self.total_comments <= 0 {
            return None;
        }
        let total = Decimal::from(self.total_comments);
        Some((
            self.sentiment_sum.checked_div(total)?,
            self.toxic_sum.checked_div(total)?,
        ))
    }
}

impl From<&AggregateDelta> for Totals {
    fn from(delta: &AggregateDelta) -> Self {
        Self {
            total_comments: delta.count,
            sentiment_sum: delta.sentiment_sum,
            toxic_sum: delta.toxic_sum,
        }
    }
}

/// Running statistics for one topic.
///
/// # Invariants
/// - Exists only once at least one comment was counted
/// - `average_* == *_sum / total_comments` once writes settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAggregate {
    pub topic_id: String,
    pub total_comments: i64,
    pub sentiment_sum: Decimal,
    pub toxic_sum: Decimal,
    pub average_sentiment: Decimal,
    pub average_toxic: Decimal,
    pub language_distribution: LanguageHistogram,
    pub last_updated: DateTime<Utc>,
}

impl TopicAggregate {
    /// Build the first aggregate of a topic from a single delta.
    /// Returns `None` for an empty delta: a topic with no comments has no aggregate.
    pub fn initial(topic_id: &str, delta: &AggregateDelta, now: DateTime<Utc>) -> Option<Self> {
        let totals = Totals::from(delta);
        let (average_sentiment, average_toxic) = totals.averages()?;

        Some(Self {
            topic_id: topic_id.to_string(),
            total_comments: totals.total_comments,
            sentiment_sum: totals.sentiment_sum,
            toxic_sum: totals.toxic_sum,
            average_sentiment,
            average_toxic,
            language_distribution: delta.languages.clone(),
            last_updated: now,
        })
    }

    pub fn totals(&self) -> Totals {
        Totals {
            total_comments: self.total_comments,
            sentiment_sum: self.sentiment_sum,
            toxic_sum: self.toxic_sum,
        }
    }
}

/// Immutable snapshot of a topic's key fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "post_id")]
    pub topic_id: String,
    pub last_updated: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_sentiment: Decimal,
    pub total_comments: i64,
}

impl From<&TopicAggregate> for HistoryEntry {
    fn from(aggregate: &TopicAggregate) -> Self {
        Self {
            topic_id: aggregate.topic_id.clone(),
            last_updated: aggregate.last_updated,
            average_sentiment: aggregate.average_sentiment,
            total_comments: aggregate.total_comments,
        }
    }
}
