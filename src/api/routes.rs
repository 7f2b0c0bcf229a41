//! API Routes
//!
//! Read-only endpoints over topic metadata, aggregates and history.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{HistoryEntry, LanguageHistogram, TopicAggregate, TopicMetadata};
use crate::error::{AppError, AppResult};
use crate::store::{AggregateStore, HistoryStore, TopicStore};

/// Stores behind the read API
#[derive(Clone)]
pub struct AppState {
    pub topics: Arc<dyn TopicStore>,
    pub aggregates: Arc<dyn AggregateStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    /// State backed by one store implementing every trait
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TopicStore + AggregateStore + HistoryStore + 'static,
    {
        Self {
            topics: store.clone(),
            aggregates: store.clone(),
            history: store,
        }
    }
}

// =========================================================================
// Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct PostSummary {
    pub post_id: String,
    pub content: String,
    pub created_time: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub media_url: String,
    pub post_type: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_sentiment: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_toxic: Decimal,
    pub total_comments: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub sentiment_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub toxic_sum: Decimal,
}

#[derive(Debug, Default, Serialize)]
pub struct Analytics {
    #[serde(with = "rust_decimal::serde::float")]
    pub average_sentiment: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_toxic: Decimal,
    pub total_comments: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub sentiment_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub toxic_sum: Decimal,
    pub language_distribution: LanguageHistogram,
}

#[derive(Debug, Serialize)]
pub struct PostAnalytics {
    pub post_id: String,
    pub content: String,
    pub created_time: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub media_url: String,
    pub post_type: String,
    pub analytics: Analytics,
}

impl From<Option<&TopicAggregate>> for Analytics {
    fn from(aggregate: Option<&TopicAggregate>) -> Self {
        match aggregate {
            Some(a) => Self {
                average_sentiment: a.average_sentiment,
                average_toxic: a.average_toxic,
                total_comments: a.total_comments,
                sentiment_sum: a.sentiment_sum,
                toxic_sum: a.toxic_sum,
                language_distribution: a.language_distribution.clone(),
            },
            None => Self::default(),
        }
    }
}

/// Metadata fields of a topic, empty when only the aggregate is known
fn describe(topic_id: &str, topic: Option<&TopicMetadata>) -> (String, String, String, String) {
    match topic {
        Some(t) => (
            t.content.clone(),
            t.created_time.clone(),
            t.media_url.clone(),
            t.post_type.clone(),
        ),
        None => {
            tracing::debug!(topic_id, "Aggregate without topic metadata");
            Default::default()
        }
    }
}

fn summarize(
    topic_id: &str,
    topic: Option<&TopicMetadata>,
    aggregate: Option<&TopicAggregate>,
) -> PostSummary {
    let (content, created_time, media_url, post_type) = describe(topic_id, topic);
    let analytics = Analytics::from(aggregate);

    PostSummary {
        post_id: topic_id.to_string(),
        content,
        created_time,
        last_updated: aggregate.map(|a| a.last_updated),
        media_url,
        post_type,
        average_sentiment: analytics.average_sentiment,
        average_toxic: analytics.average_toxic,
        total_comments: analytics.total_comments,
        sentiment_sum: analytics.sentiment_sum,
        toxic_sum: analytics.toxic_sum,
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/:post_id/analytics", get(get_post_analytics))
        .route("/posts/:post_id/history", get(get_post_history))
        .fallback(route_not_found)
}

// =========================================================================
// GET /posts
// =========================================================================

/// Every known topic, with zeros where no comment was counted yet
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<PostSummary>>> {
    let topics = state.topics.list_topics().await?;
    let aggregates = state.aggregates.scan_aggregates().await?;

    let mut merged: BTreeMap<String, (Option<TopicMetadata>, Option<TopicAggregate>)> =
        BTreeMap::new();
    for topic in topics {
        let key = topic.topic_id.clone();
        merged.entry(key).or_default().0 = Some(topic);
    }
    for aggregate in aggregates {
        let key = aggregate.topic_id.clone();
        merged.entry(key).or_default().1 = Some(aggregate);
    }

    Ok(Json(
        merged
            .iter()
            .map(|(id, (topic, aggregate))| summarize(id, topic.as_ref(), aggregate.as_ref()))
            .collect(),
    ))
}

// =========================================================================
// GET /posts/:post_id/analytics
// =========================================================================

async fn get_post_analytics(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<PostAnalytics>> {
    let topic = state.topics.get_topic(&post_id).await?;
    let aggregate = state.aggregates.get_aggregate(&post_id).await?;

    if topic.is_none() && aggregate.is_none() {
        return Err(AppError::PostNotFound(post_id));
    }

    let (content, created_time, media_url, post_type) = describe(&post_id, topic.as_ref());
    Ok(Json(PostAnalytics {
        last_updated: aggregate.as_ref().map(|a| a.last_updated),
        analytics: Analytics::from(aggregate.as_ref()),
        post_id,
        content,
        created_time,
        media_url,
        post_type,
    }))
}

// =========================================================================
// GET /posts/:post_id/history
// =========================================================================

async fn get_post_history(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.history.history(&post_id).await?))
}

async fn route_not_found() -> AppError {
    AppError::RouteNotFound
}
