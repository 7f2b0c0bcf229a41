//! NLP service clients

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DetectedLanguage, LanguageDetector, ScoringError, SentimentClassifier};

#[derive(Debug, Serialize)]
struct DetectLanguageRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectLanguageResponse {
    #[serde(default)]
    languages: Vec<DetectedLanguage>,
}

#[derive(Debug, Serialize)]
struct SentimentRequest<'a> {
    text: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    sentiment: String,
}

/// JSON-over-HTTP NLP service
#[derive(Debug, Clone)]
pub struct HttpNlpClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNlpClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ScoringError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.endpoint, path);
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScoringError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&resp.text().await?)?)
    }
}

#[async_trait]
impl LanguageDetector for HttpNlpClient {
    async fn detect(&self, text: &str) -> Result<Vec<DetectedLanguage>, ScoringError> {
        let resp: DetectLanguageResponse = self
            .post("detect-language", &DetectLanguageRequest { text })
            .await?;
        Ok(resp.languages)
    }
}

#[async_trait]
impl SentimentClassifier for HttpNlpClient {
    async fn classify(&self, text: &str, language_code: &str) -> Result<String, ScoringError> {
        let resp: SentimentResponse = self
            .post("sentiment", &SentimentRequest { text, language_code })
            .await?;
        Ok(resp.sentiment)
    }
}

/// Stand-in when no NLP endpoint is configured: every call fails, so the
/// scorer applies its defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackNlp;

#[async_trait]
impl LanguageDetector for FallbackNlp {
    async fn detect(&self, _text: &str) -> Result<Vec<DetectedLanguage>, ScoringError> {
        Err(ScoringError::Unavailable)
    }
}

#[async_trait]
impl SentimentClassifier for FallbackNlp {
    async fn classify(&self, _text: &str, _language_code: &str) -> Result<String, ScoringError> {
        Err(ScoringError::Unavailable)
    }
}
