//! Scoring module
//!
//! Attaches language, sentiment and toxicity to a comment. Language and
//! sentiment come from an external NLP service and fall back to fixed
//! defaults when it is unavailable; toxicity is computed locally.

mod handler;
mod nlp;
mod sentiment;
mod toxicity;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{Scores, UNKNOWN_LANGUAGE};

pub use handler::ScoreHandler;
pub use nlp::{FallbackNlp, HttpNlpClient};
pub use sentiment::{sentiment_score, SentimentLabel, NEUTRAL_SENTIMENT};
pub use toxicity::{KeywordToxicity, DEFAULT_TOXIC_TERMS};

/// Language used for sentiment requests when detection gave nothing
pub const FALLBACK_SENTIMENT_LANGUAGE: &str = "en";

/// NLP service errors
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("NLP service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("NLP service not configured")]
    Unavailable,
}

impl From<reqwest::Error> for ScoringError {
    fn from(err: reqwest::Error) -> Self {
        ScoringError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ScoringError {
    fn from(err: serde_json::Error) -> Self {
        ScoringError::Parse(err.to_string())
    }
}

/// One candidate language reported by the detector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedLanguage {
    pub code: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Highest-confidence language code, or `"unknown"` when there are none
pub fn dominant_language(candidates: &[DetectedLanguage]) -> String {
    candidates
        .iter()
        .filter(|c| !c.code.is_empty())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|c| c.code.clone())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, text: &str) -> Result<Vec<DetectedLanguage>, ScoringError>;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Raw four-way label for `text` in `language_code`
    async fn classify(&self, text: &str, language_code: &str) -> Result<String, ScoringError>;
}

/// Local toxicity estimate in `[0, 10]`
pub trait ToxicityScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// Combines the three scoring capabilities. Never fails: every degraded
/// path resolves to a documented default.
#[derive(Clone)]
pub struct Scorer {
    detector: Arc<dyn LanguageDetector>,
    classifier: Arc<dyn SentimentClassifier>,
    toxicity: Arc<dyn ToxicityScorer>,
}

impl Scorer {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        classifier: Arc<dyn SentimentClassifier>,
        toxicity: Arc<dyn ToxicityScorer>,
    ) -> Self {
        Self {
            detector,
            classifier,
            toxicity,
        }
    }

    /// Scorer backed by a single NLP service and the keyword heuristic
    pub fn with_nlp<N>(nlp: Arc<N>) -> Self
    where
        N: LanguageDetector + SentimentClassifier + 'static,
    {
        Self::new(nlp.clone(), nlp, Arc::new(KeywordToxicity::default()))
    }

    pub async fn score(&self, text: &str) -> Scores {
        let toxic_score = self.toxicity.score(text);

        // Nothing to classify; the services reject empty input anyway
        if text.trim().is_empty() {
            return Scores {
                language: UNKNOWN_LANGUAGE.to_string(),
                sentiment_score: NEUTRAL_SENTIMENT,
                toxic_score,
            };
        }

        let language = self.detect_language(text).await;
        let sentiment_language = if language == UNKNOWN_LANGUAGE {
            FALLBACK_SENTIMENT_LANGUAGE
        } else {
            language.as_str()
        };
        let sentiment_score = self.classify_sentiment(text, sentiment_language).await;

        Scores {
            language,
            sentiment_score,
            toxic_score,
        }
    }

    async fn detect_language(&self, text: &str) -> String {
        match self.detector.detect(text).await {
            Ok(candidates) => dominant_language(&candidates),
            Err(e) => {
                tracing::warn!(error = %e, "Language detection failed, using unknown");
                UNKNOWN_LANGUAGE.to_string()
            }
        }
    }

    async fn classify_sentiment(&self, text: &str, language_code: &str) -> f64 {
        match self.classifier.classify(text, language_code).await {
            Ok(label) => sentiment_score(&label),
            Err(e) => {
                tracing::warn!(error = %e, language_code, "Sentiment analysis failed, using neutral");
                NEUTRAL_SENTIMENT
            }
        }
    }
}
