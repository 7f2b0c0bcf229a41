//! comment_analytics Library
//!
//! Comment analytics pipeline: extraction, scoring, aggregation and
//! history snapshots, plus the read API over the results.

pub mod aggregation;
pub mod api;
pub mod dedup;
pub mod domain;
pub mod extractor;
pub mod jobs;
pub mod queue;
pub mod scoring;
pub mod snapshot;
pub mod source;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{BatchResponse, Comment, EnrichedComment, Envelope, HistoryEntry, TopicAggregate};
