//! Postgres-backed store, queue and ledger tests.
//! Skipped when `DATABASE_URL` is not set.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;

use comment_analytics::aggregation::{ApplyOutcome, Aggregator};
use comment_analytics::db;
use comment_analytics::dedup::{DedupLedger, LedgerScope, PgDedupLedger};
use comment_analytics::domain::{AggregateDelta, EnrichedComment, HistoryEntry};
use comment_analytics::queue::{MessageQueue, PgQueue};
use comment_analytics::snapshot::Snapshotter;
use comment_analytics::store::{AddOutcome, AggregateStore, HistoryStore, PgStore};

mod common;

fn record(topic: &str, id: &str, language: &str, sentiment: f64, toxic: f64) -> EnrichedComment {
    serde_json::from_value(json!({
        "comment_id": id,
        "post_id": topic,
        "language": language,
        "sentiment_score": sentiment,
        "toxic_score": toxic,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_schema_is_complete() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    db::verify_connection(&pool).await.unwrap();
    assert!(db::check_schema(&pool).await.unwrap());
}

#[tokio::test]
async fn test_store_add_initialize_derive() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = PgStore::new(pool);
    let topic = common::unique("pg-t1");
    let records = [record(&topic, "c1", "en", 6.0, 2.0)];
    let delta = AggregateDelta::from_records(records.iter());

    assert_eq!(
        store.add_totals(&topic, &delta).await.unwrap(),
        AddOutcome::Missing
    );

    let aggregator = Aggregator::new(Arc::new(store.clone()));
    let outcome = aggregator.apply(&topic, records.iter()).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Initialized));

    let more = [
        record(&topic, "c2", "vi", 8.0, 0.0),
        record(&topic, "c3", "en", 4.0, 1.0),
    ];
    let outcome = aggregator.apply(&topic, more.iter()).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Updated(_)));

    let aggregate = store.get_aggregate(&topic).await.unwrap().unwrap();
    assert_eq!(aggregate.total_comments, 3);
    assert_eq!(aggregate.sentiment_sum, dec!(18));
    assert_eq!(aggregate.average_sentiment, dec!(6));
    assert_eq!(aggregate.average_toxic, dec!(1));
    assert_eq!(aggregate.language_distribution.get("en"), Some(&2));
    assert_eq!(aggregate.language_distribution.get("vi"), Some(&1));

    let other = common::unique("pg-t2");
    let records = [record(&other, "c4", "fr", 2.0, 0.0)];
    aggregator.apply(&other, records.iter()).await.unwrap();

    let all = store.scan_aggregates().await.unwrap();
    assert!(all.windows(2).all(|w| w[0].topic_id < w[1].topic_id));

    let scanned = all.iter().find(|a| a.topic_id == topic).unwrap();
    assert_eq!(scanned.language_distribution.len(), 2);
    assert_eq!(scanned.language_distribution.get("en"), Some(&2));
    assert_eq!(scanned.language_distribution.get("vi"), Some(&1));

    let scanned = all.iter().find(|a| a.topic_id == other).unwrap();
    assert_eq!(scanned.language_distribution.len(), 1);
    assert_eq!(scanned.language_distribution.get("fr"), Some(&1));
}

#[tokio::test]
async fn test_store_concurrent_applies_lose_nothing() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let aggregator = Aggregator::new(Arc::new(PgStore::new(pool.clone())));
    let topic = common::unique("pg-race");

    let mut handles = Vec::new();
    for i in 0..10 {
        let aggregator = aggregator.clone();
        let topic = topic.clone();
        handles.push(tokio::spawn(async move {
            let records = [record(&topic, &format!("c{}", i), "en", 5.0, 1.0)];
            aggregator.apply(&topic, records.iter()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregate = PgStore::new(pool)
        .get_aggregate(&topic)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate.total_comments, 10);
    assert_eq!(aggregate.sentiment_sum, dec!(50));
    assert_eq!(aggregate.average_sentiment, dec!(5));
    assert_eq!(aggregate.language_distribution.get("en"), Some(&10));
}

#[tokio::test]
async fn test_history_append_and_snapshot() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgStore::new(pool));
    let topic = common::unique("pg-h1");
    let records = [record(&topic, "c1", "en", 9.0, 0.0)];
    Aggregator::new(store.clone())
        .apply(&topic, records.iter())
        .await
        .unwrap();

    let report = Snapshotter::new(store.clone(), store.clone())
        .run()
        .await
        .unwrap();
    assert!(report.written >= 1);

    let history = store.history(&topic).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_comments, 1);

    // Same key appended twice keeps one entry
    store.append_history(&history[0]).await.unwrap();
    assert_eq!(store.history(&topic).await.unwrap().len(), 1);

    let older = HistoryEntry {
        last_updated: history[0].last_updated - chrono::Duration::hours(1),
        ..history[0].clone()
    };
    store.append_history(&older).await.unwrap();
    let history = store.history(&topic).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].last_updated < history[1].last_updated);
    assert!(history[1].last_updated <= Utc::now());
}

#[tokio::test]
async fn test_snapshot_skips_undecodable_row() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let good = common::unique("pg-good");
    let bad = common::unique("pg-bad");

    let records = [record(&good, "c1", "en", 7.0, 0.0)];
    Aggregator::new(store.clone())
        .apply(&good, records.iter())
        .await
        .unwrap();

    // NaN is a valid NUMERIC but has no Decimal representation
    sqlx::query(
        r#"
        INSERT INTO topic_aggregates
            (topic_id, total_comments, sentiment_sum, toxic_sum,
             average_sentiment, average_toxic, last_updated)
        VALUES ($1, 1, 5, 0, 'NaN', 0, NOW())
        "#,
    )
    .bind(&bad)
    .execute(&pool)
    .await
    .unwrap();

    assert!(store.get_aggregate(&bad).await.is_err());

    let scanned = store.scan_aggregates().await.unwrap();
    assert!(scanned.iter().any(|a| a.topic_id == good));
    assert!(!scanned.iter().any(|a| a.topic_id == bad));

    let report = Snapshotter::new(store.clone(), store.clone()).run().await;

    sqlx::query("DELETE FROM topic_aggregates WHERE topic_id = $1")
        .bind(&bad)
        .execute(&pool)
        .await
        .unwrap();

    assert!(report.is_ok());
    assert_eq!(store.history(&good).await.unwrap().len(), 1);
    assert!(store.history(&bad).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_receive_ack_and_redelivery() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let queue = PgQueue::new(pool.clone(), common::unique("pg-queue"), Duration::from_millis(200));

    let first = queue.send("one").await.unwrap();
    queue.send("two").await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 2);

    let batch = queue.receive(10).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert!(queue.receive(10).await.unwrap().is_empty());

    queue.ack(&[first]).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    // The unacknowledged message comes back after the visibility timeout
    tokio::time::sleep(Duration::from_millis(300)).await;
    let batch = queue.receive(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body, "two");

    // Queues are isolated by name
    let other = PgQueue::new(pool, common::unique("pg-other"), Duration::from_secs(30));
    assert!(other.receive(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_scopes_are_independent() {
    let Some(pool) = common::setup_test_db().await else {
        return;
    };
    let extracted = PgDedupLedger::new(pool.clone(), LedgerScope::Extracted);
    let aggregated = PgDedupLedger::new(pool, LedgerScope::Aggregated);
    let id = common::unique("c");

    assert!(!extracted.seen(&id).await.unwrap());
    let before = extracted.count().await.unwrap();
    extracted.mark_seen(&id).await.unwrap();
    extracted.mark_seen(&id).await.unwrap();

    assert!(extracted.seen(&id).await.unwrap());
    assert!(!aggregated.seen(&id).await.unwrap());
    assert!(extracted.count().await.unwrap() >= before + 1);
}
