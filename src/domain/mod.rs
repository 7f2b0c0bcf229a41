//! Domain module
//!
//! Records that flow through the pipeline and the aggregates it maintains.

pub mod comment;
pub mod message;
pub mod topic;

pub use comment::{
    score_to_decimal, Comment, CommentMetadata, EnrichedComment, Scores, MAX_SCORE,
    STATUS_COMPLETED, UNKNOWN_LANGUAGE,
};
pub use message::{BatchItemFailure, BatchResponse, Envelope, MessageError};
pub use topic::{
    merge_histogram, AggregateDelta, HistoryEntry, LanguageHistogram, TopicAggregate,
    TopicMetadata, Totals, DEFAULT_POST_TYPE,
};
