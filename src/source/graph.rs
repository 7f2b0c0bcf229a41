//! Graph API client
//!
//! Pulls a page's recent posts with attachments and comments embedded.

use async_trait::async_trait;

use super::{FeedError, Paged, SourceFeed, SourcePost};

/// Default API root, pinned to the version the field selection targets
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v3.1";

#[derive(Debug, Clone)]
pub struct GraphFeedConfig {
    pub api_base: String,
    pub page_id: String,
    pub access_token: String,
    /// Comments embedded per post
    pub comment_limit: u32,
}

pub struct GraphFeed {
    client: reqwest::Client,
    config: GraphFeedConfig,
}

impl GraphFeed {
    pub fn new(config: GraphFeedConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn fields(&self) -> String {
        format!(
            "id,message,created_time,attachments{{type,media,url}},comments.limit({}){{id,message,created_time}}",
            self.config.comment_limit
        )
    }
}

#[async_trait]
impl SourceFeed for GraphFeed {
    async fn fetch(&self, page_limit: u32) -> Result<Vec<SourcePost>, FeedError> {
        let url = format!(
            "{}/{}/posts",
            self.config.api_base.trim_end_matches('/'),
            self.config.page_id
        );

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("fields", self.fields()),
                ("limit", page_limit.to_string()),
                ("access_token", self.config.access_token.clone()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let page: Paged<SourcePost> = serde_json::from_str(&resp.text().await?)?;
        tracing::info!(
            page_id = %self.config.page_id,
            posts = page.data.len(),
            "Fetched posts from source feed"
        );
        Ok(page.data)
    }
}
