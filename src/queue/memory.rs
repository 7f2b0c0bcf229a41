//! In-memory queue with visibility timeouts

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::Envelope;

use super::{MessageQueue, QueueError};

#[derive(Debug)]
struct StoredMessage {
    id: String,
    body: String,
    visible_at: Instant,
    receive_count: u32,
}

/// Process-local queue. Clones share the same messages.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: String,
    visibility_timeout: Duration,
    messages: Arc<Mutex<VecDeque<StoredMessage>>>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            messages: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Messages not yet acknowledged, visible or not
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Bodies of every unacknowledged message, in enqueue order
    pub async fn bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// How many times the message has been handed out
    pub async fn receive_count(&self, id: &str) -> Option<u32> {
        self.messages
            .lock()
            .await
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.receive_count)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        self.messages.lock().await.push_back(StoredMessage {
            id: id.clone(),
            body: body.to_string(),
            visible_at: Instant::now(),
            receive_count: 0,
        });
        Ok(id)
    }

    async fn receive(&self, max: usize) -> Result<Vec<Envelope>, QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().await;

        let mut batch = Vec::new();
        for message in messages.iter_mut() {
            if batch.len() >= max {
                break;
            }
            if message.visible_at <= now {
                message.visible_at = now + self.visibility_timeout;
                message.receive_count += 1;
                batch.push(Envelope::from_text(message.id.clone(), message.body.clone()));
            }
        }

        Ok(batch)
    }

    async fn ack(&self, ids: &[String]) -> Result<(), QueueError> {
        self.messages
            .lock()
            .await
            .retain(|m| !ids.contains(&m.id));
        Ok(())
    }
}
