//! Source feed
//!
//! Boundary to the social-graph API. A fetch returns one page of posts with
//! their comments embedded, in the shape the graph API reports them.

mod graph;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::domain::{Comment, CommentMetadata, TopicMetadata, DEFAULT_POST_TYPE};

pub use graph::{GraphFeed, GraphFeedConfig, DEFAULT_API_BASE};

/// Timestamp format used by the graph API (`2024-01-31T10:00:00+0000`)
pub const SOURCE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Feed errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

/// `{"data": [...]}` wrapper used for every graph connection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageSource {
    #[serde(default)]
    pub src: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentMedia {
    #[serde(default)]
    pub image: Option<ImageSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub media: Option<AttachmentMedia>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceComment {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub created_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePost {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub attachments: Option<Paged<Attachment>>,
    #[serde(default)]
    pub comments: Option<Paged<SourceComment>>,
}

impl SourcePost {
    /// `(post_type, media_url)` derived from the first attachment.
    ///
    /// The media URL is the image source when present, else the
    /// attachment's direct URL, else empty.
    pub fn media(&self) -> (String, String) {
        let Some(attachment) = self.attachments.as_ref().and_then(|a| a.data.first()) else {
            return (DEFAULT_POST_TYPE.to_string(), String::new());
        };

        let post_type = attachment
            .kind
            .clone()
            .unwrap_or_else(|| DEFAULT_POST_TYPE.to_string());

        let media_url = attachment
            .media
            .as_ref()
            .and_then(|m| m.image.as_ref())
            .and_then(|i| i.src.clone())
            .or_else(|| attachment.url.clone())
            .unwrap_or_default();

        (post_type, media_url)
    }

    pub fn metadata(&self) -> TopicMetadata {
        let (post_type, media_url) = self.media();
        TopicMetadata {
            topic_id: self.id.clone(),
            content: self.message.clone().unwrap_or_default(),
            post_type,
            media_url,
            created_time: self.created_time.clone(),
        }
    }

    pub fn comments(&self) -> &[SourceComment] {
        self.comments
            .as_ref()
            .map(|c| c.data.as_slice())
            .unwrap_or_default()
    }
}

impl SourceComment {
    /// Convert to a pipeline comment attached to `post`
    pub fn to_comment(&self, post_id: &str, metadata: CommentMetadata) -> Result<Comment, FeedError> {
        let created_at = DateTime::parse_from_str(&self.created_time, SOURCE_TIME_FORMAT)
            .map_err(|e| {
                FeedError::Parse(format!(
                    "created_time '{}' of comment {}: {}",
                    self.created_time, self.id, e
                ))
            })?
            .timestamp();

        Ok(Comment::new(&self.id, post_id, self.message.clone().unwrap_or_default())
            .with_created_at(created_at)
            .with_metadata(metadata))
    }
}

/// One page of posts per call
#[async_trait]
pub trait SourceFeed: Send + Sync {
    async fn fetch(&self, page_limit: u32) -> Result<Vec<SourcePost>, FeedError>;
}
