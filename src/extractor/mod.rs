//! Extractor
//!
//! One cycle pulls recent posts from the source feed, upserts each post's
//! metadata and emits every comment not yet in the ledger onto the intake
//! queue. A comment is marked in the ledger only after its send succeeded,
//! so a failed send is retried on the next cycle.

use std::collections::HashSet;
use std::sync::Arc;

use crate::dedup::{already_seen, record_seen, DedupLedger};
use crate::domain::CommentMetadata;
use crate::queue::{send_json, MessageQueue};
use crate::snapshot::SnapshotTrigger;
use crate::source::{FeedError, SourceFeed};
use crate::store::TopicStore;

/// Source name attached to snapshot requests
const TRIGGER_SOURCE: &str = "extractor";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Posts per fetch (default: 5)
    pub page_limit: u32,
    pub page_id: String,
    /// Platform label written into comment metadata
    pub platform: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            page_limit: 5,
            page_id: String::new(),
            platform: "Facebook".to_string(),
        }
    }
}

/// Counters of one extraction cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub posts: usize,
    pub new_comments: usize,
    pub skipped_comments: usize,
    pub messages_sent: usize,
    pub send_failures: usize,
}

pub struct Extractor {
    feed: Arc<dyn SourceFeed>,
    ledger: Arc<dyn DedupLedger>,
    topics: Arc<dyn TopicStore>,
    intake: Arc<dyn MessageQueue>,
    trigger: Option<SnapshotTrigger>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(
        feed: Arc<dyn SourceFeed>,
        ledger: Arc<dyn DedupLedger>,
        topics: Arc<dyn TopicStore>,
        intake: Arc<dyn MessageQueue>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            feed,
            ledger,
            topics,
            intake,
            trigger: None,
            config,
        }
    }

    /// Request a snapshot after every cycle that emitted comments
    pub fn with_trigger(mut self, trigger: SnapshotTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub async fn run_cycle(&self) -> Result<ExtractReport, FeedError> {
        let posts = self.feed.fetch(self.config.page_limit).await?;
        let mut report = ExtractReport {
            posts: posts.len(),
            ..Default::default()
        };
        let mut emitted: HashSet<String> = HashSet::new();

        for post in &posts {
            let topic = post.metadata();
            if let Err(e) = self.topics.upsert_topic(&topic).await {
                tracing::error!(topic_id = %post.id, error = %e, "Failed to save topic metadata");
            }

            let metadata = CommentMetadata {
                platform: self.config.platform.clone(),
                page_id: self.config.page_id.clone(),
                post_type: topic.post_type.clone(),
            };

            for source_comment in post.comments() {
                if emitted.contains(&source_comment.id)
                    || already_seen(self.ledger.as_ref(), &source_comment.id).await
                {
                    report.skipped_comments += 1;
                    continue;
                }

                let comment = match source_comment.to_comment(&post.id, metadata.clone()) {
                    Ok(comment) => comment,
                    Err(e) => {
                        tracing::warn!(comment_id = %source_comment.id, error = %e, "Skipping unparseable comment");
                        report.skipped_comments += 1;
                        continue;
                    }
                };

                report.new_comments += 1;
                match send_json(self.intake.as_ref(), &comment).await {
                    Ok(_) => {
                        report.messages_sent += 1;
                        emitted.insert(comment.comment_id.clone());
                        record_seen(self.ledger.as_ref(), &comment.comment_id).await;
                    }
                    Err(e) => {
                        tracing::error!(comment_id = %comment.comment_id, error = %e, "Failed to send comment");
                        report.send_failures += 1;
                    }
                }
            }
        }

        if report.messages_sent > 0 {
            if let Some(trigger) = &self.trigger {
                trigger.request(TRIGGER_SOURCE);
            }
        }

        tracing::info!(
            posts = report.posts,
            new_comments = report.new_comments,
            skipped = report.skipped_comments,
            sent = report.messages_sent,
            send_failures = report.send_failures,
            "Extraction cycle completed"
        );
        Ok(report)
    }
}
