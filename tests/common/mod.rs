//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;

use comment_analytics::aggregation::{AggregateHandler, Aggregator};
use comment_analytics::dedup::MemoryDedupLedger;
use comment_analytics::extractor::{Extractor, ExtractorConfig};
use comment_analytics::queue::{MemoryQueue, QueueWorker, INTAKE_QUEUE, RESULT_QUEUE};
use comment_analytics::scoring::{
    DetectedLanguage, KeywordToxicity, LanguageDetector, ScoreHandler, Scorer, ScoringError,
    SentimentClassifier,
};
use comment_analytics::snapshot::Snapshotter;
use comment_analytics::source::{FeedError, SourceFeed, SourcePost};
use comment_analytics::store::MemoryStore;

/// Feed returning whatever posts were last set
#[derive(Default)]
pub struct FakeFeed {
    posts: Mutex<Vec<SourcePost>>,
}

impl FakeFeed {
    pub async fn set(&self, posts: serde_json::Value) {
        *self.posts.lock().await = serde_json::from_value(posts).unwrap();
    }
}

#[async_trait]
impl SourceFeed for FakeFeed {
    async fn fetch(&self, _page_limit: u32) -> Result<Vec<SourcePost>, FeedError> {
        Ok(self.posts.lock().await.clone())
    }
}

/// NLP stand-in: English everywhere, POSITIVE unless the text mentions "bad"
pub struct FakeNlp;

#[async_trait]
impl LanguageDetector for FakeNlp {
    async fn detect(&self, _text: &str) -> Result<Vec<DetectedLanguage>, ScoringError> {
        Ok(vec![DetectedLanguage {
            code: "en".to_string(),
            confidence: 0.99,
        }])
    }
}

#[async_trait]
impl SentimentClassifier for FakeNlp {
    async fn classify(&self, text: &str, _language_code: &str) -> Result<String, ScoringError> {
        if text.contains("bad") {
            Ok("NEGATIVE".to_string())
        } else {
            Ok("POSITIVE".to_string())
        }
    }
}

/// Every stage wired over in-memory stores and queues
pub struct Pipeline {
    pub feed: Arc<FakeFeed>,
    pub store: MemoryStore,
    pub intake: MemoryQueue,
    pub results: MemoryQueue,
    pub extractor: Extractor,
    pub scorer: QueueWorker,
    pub aggregator: QueueWorker,
    pub snapshotter: Snapshotter,
}

impl Pipeline {
    pub fn new() -> Self {
        let feed = Arc::new(FakeFeed::default());
        let store = MemoryStore::new();
        let intake = MemoryQueue::new(INTAKE_QUEUE, Duration::from_secs(30));
        let results = MemoryQueue::new(RESULT_QUEUE, Duration::from_secs(30));

        let extractor = Extractor::new(
            feed.clone(),
            Arc::new(MemoryDedupLedger::new()),
            Arc::new(store.clone()),
            Arc::new(intake.clone()),
            ExtractorConfig {
                page_id: "42".to_string(),
                ..Default::default()
            },
        );

        let nlp = Arc::new(FakeNlp);
        let scorer = QueueWorker::new(
            Arc::new(intake.clone()),
            Arc::new(ScoreHandler::new(
                Scorer::new(nlp.clone(), nlp, Arc::new(KeywordToxicity::default())),
                Arc::new(results.clone()),
            )),
        );

        let aggregator = QueueWorker::new(
            Arc::new(results.clone()),
            Arc::new(AggregateHandler::new(
                Aggregator::new(Arc::new(store.clone())),
                Arc::new(MemoryDedupLedger::new()),
            )),
        );

        let snapshotter = Snapshotter::new(Arc::new(store.clone()), Arc::new(store.clone()));

        Self {
            feed,
            store,
            intake,
            results,
            extractor,
            scorer,
            aggregator,
            snapshotter,
        }
    }

    /// One extraction followed by draining both queues
    pub async fn run_once(&self) {
        self.extractor.run_cycle().await.unwrap();
        self.scorer.drain().await.unwrap();
        self.aggregator.drain().await.unwrap();
    }
}

/// Two posts: p1 with three comments, p2 with one
pub fn sample_posts() -> serde_json::Value {
    json!([
        {
            "id": "p1",
            "message": "Product launch",
            "created_time": "2024-01-01T00:00:00+0000",
            "attachments": {"data": [{"type": "photo", "media": {"image": {"src": "https://img/1.jpg"}}}]},
            "comments": {"data": [
                {"id": "c1", "message": "great launch", "created_time": "2024-01-01T00:01:00+0000"},
                {"id": "c2", "message": "bad idea", "created_time": "2024-01-01T00:02:00+0000"},
                {"id": "c3", "message": "I hate waiting", "created_time": "2024-01-01T00:03:00+0000"}
            ]}
        },
        {
            "id": "p2",
            "message": "Weekly update",
            "created_time": "2024-01-02T00:00:00+0000",
            "comments": {"data": [
                {"id": "c4", "message": "thanks", "created_time": "2024-01-02T00:01:00+0000"}
            ]}
        }
    ])
}

/// Connect to the test database.
/// Returns `None` when `DATABASE_URL` is not set.
///
/// Tests share one database and run in parallel, so each test works on
/// its own ids from [`unique`] instead of clearing tables.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    Some(pool)
}

/// Id unique to one test run
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
