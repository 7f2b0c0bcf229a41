//! Scorer stage: intake queue in, result queue out

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{BatchResponse, Comment, Envelope};
use crate::queue::{send_json, BatchHandler, MessageQueue};

use super::Scorer;

pub struct ScoreHandler {
    scorer: Scorer,
    results: Arc<dyn MessageQueue>,
}

impl ScoreHandler {
    pub fn new(scorer: Scorer, results: Arc<dyn MessageQueue>) -> Self {
        Self { scorer, results }
    }

    async fn process(&self, envelope: &Envelope) -> Result<(), String> {
        let comment: Comment = envelope.decode().map_err(|e| e.to_string())?;
        let scores = self.scorer.score(&comment.text).await;
        let enriched = comment.enrich(scores);

        send_json(self.results.as_ref(), &enriched)
            .await
            .map_err(|e| format!("forwarding comment {}: {}", enriched.comment_id, e))?;
        Ok(())
    }
}

#[async_trait]
impl BatchHandler for ScoreHandler {
    async fn handle(&self, batch: &[Envelope], deadline: Instant) -> BatchResponse {
        let mut failures = Vec::new();

        for (index, envelope) in batch.iter().enumerate() {
            if Instant::now() >= deadline {
                let remaining = &batch[index..];
                tracing::warn!(
                    remaining = remaining.len(),
                    "Scoring deadline passed, leaving the rest for redelivery"
                );
                failures.extend(remaining.iter().map(|e| e.id.clone()));
                break;
            }
            if let Err(e) = self.process(envelope).await {
                tracing::error!(message_id = %envelope.id, error = %e, "Failed to score comment");
                failures.push(envelope.id.clone());
            }
        }

        tracing::info!(
            received = batch.len(),
            failed = failures.len(),
            "Scored batch"
        );
        BatchResponse::from_failures(failures)
    }
}
