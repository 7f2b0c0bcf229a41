//! Comment records
//!
//! Raw comments as emitted by the extractor and enriched comments as
//! emitted by the scorer. Field names on the wire follow the queue message
//! format shared by every pipeline stage.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MessageError;

/// Inclusive upper bound of sentiment and toxicity scores
pub const MAX_SCORE: f64 = 10.0;

/// Language reported when detection is unavailable
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Processing status attached to every enriched comment
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Where a comment came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentMetadata {
    pub platform: String,
    pub page_id: String,
    pub post_type: String,
}

/// A raw comment pulled from the source feed.
///
/// Immutable once created. The same comment may be delivered more than
/// once; the dedup ledger keeps it from being counted twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,

    /// Topic (post) the comment belongs to
    #[serde(rename = "post_id", alias = "topic_id")]
    pub topic_id: String,

    #[serde(rename = "comment_text", alias = "text", default)]
    pub text: String,

    /// Creation time as unix seconds
    #[serde(rename = "timestamp", alias = "created_at", default)]
    pub created_at: i64,

    #[serde(default)]
    pub metadata: CommentMetadata,
}

impl Comment {
    pub fn new(comment_id: impl Into<String>, topic_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            topic_id: topic_id.into(),
            text: text.into(),
            created_at: 0,
            metadata: CommentMetadata::default(),
        }
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_metadata(mut self, metadata: CommentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach scores, producing the record consumed by the aggregator
    pub fn enrich(self, scores: Scores) -> EnrichedComment {
        EnrichedComment {
            comment_id: self.comment_id,
            topic_id: self.topic_id,
            text: self.text,
            created_at: self.created_at,
            language: scores.language,
            sentiment_score: scores.sentiment_score,
            toxic_score: scores.toxic_score,
            processed_status: STATUS_COMPLETED.to_string(),
            metadata: self.metadata,
        }
    }
}

/// Scorer output for one comment
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub language: String,
    pub sentiment_score: f64,
    pub toxic_score: f64,
}

fn default_language() -> String {
    UNKNOWN_LANGUAGE.to_string()
}

fn default_status() -> String {
    STATUS_COMPLETED.to_string()
}

/// A comment with language, sentiment and toxicity attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedComment {
    pub comment_id: String,

    #[serde(rename = "post_id", alias = "topic_id")]
    pub topic_id: String,

    #[serde(rename = "comment_text", alias = "text", default)]
    pub text: String,

    #[serde(rename = "timestamp", alias = "created_at", default)]
    pub created_at: i64,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub sentiment_score: f64,

    #[serde(default)]
    pub toxic_score: f64,

    #[serde(default = "default_status")]
    pub processed_status: String,

    #[serde(default)]
    pub metadata: CommentMetadata,
}

impl EnrichedComment {
    /// Reject records without ids or whose scores fall outside `[0, 10]`
    pub fn validate(&self) -> Result<(), MessageError> {
        for (name, score) in [
            ("sentiment_score", self.sentiment_score),
            ("toxic_score", self.toxic_score),
        ] {
            if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
                return Err(MessageError::Malformed(format!(
                    "{} out of range: {}",
                    name, score
                )));
            }
        }
        if self.comment_id.is_empty() {
            return Err(MessageError::Malformed("empty comment_id".to_string()));
        }
        if self.topic_id.is_empty() {
            return Err(MessageError::Malformed("empty post_id".to_string()));
        }
        Ok(())
    }

    pub fn sentiment(&self) -> Decimal {
        score_to_decimal(self.sentiment_score)
    }

    pub fn toxicity(&self) -> Decimal {
        score_to_decimal(self.toxic_score)
    }
}

/// Convert a wire score to the decimal representation used for sums
pub fn score_to_decimal(score: f64) -> Decimal {
    Decimal::from_f64(score).unwrap_or(Decimal::ZERO)
}
