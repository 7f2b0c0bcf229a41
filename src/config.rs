//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::source::DEFAULT_API_BASE;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub source: SourceConfig,

    /// NLP service root; `None` means scoring always uses fallback defaults
    pub nlp_endpoint: Option<String>,

    pub extract_interval: Duration,
    pub snapshot_interval: Duration,
    /// Delay between a productive extraction and its snapshot request
    pub snapshot_trigger_delay: Duration,

    pub queue: QueueConfig,
}

/// Social-graph source settings
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub access_token: String,
    pub page_id: String,
    pub api_base: String,
    pub page_limit: u32,
    pub comment_limit: u32,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let source = SourceConfig {
            access_token: env::var("SOURCE_ACCESS_TOKEN").unwrap_or_default(),
            page_id: env::var("SOURCE_PAGE_ID").unwrap_or_default(),
            api_base: env::var("SOURCE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            page_limit: parse_env("SOURCE_PAGE_LIMIT", 5)?,
            comment_limit: parse_env("SOURCE_COMMENT_LIMIT", 50)?,
        };

        let queue = QueueConfig {
            batch_size: parse_env("QUEUE_BATCH_SIZE", 10)?,
            visibility_timeout: Duration::from_secs(parse_env(
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                30,
            )?),
            poll_interval: Duration::from_millis(parse_env("QUEUE_POLL_INTERVAL_MS", 1000)?),
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            source,
            nlp_endpoint: env::var("NLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            extract_interval: Duration::from_secs(parse_env("EXTRACT_INTERVAL_SECS", 300)?),
            snapshot_interval: Duration::from_secs(parse_env("SNAPSHOT_INTERVAL_SECS", 3600)?),
            snapshot_trigger_delay: Duration::from_secs(parse_env(
                "SNAPSHOT_TRIGGER_DELAY_SECS",
                10,
            )?),
            queue,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether the source feed can be polled at all
    pub fn source_configured(&self) -> bool {
        !self.source.access_token.is_empty() && !self.source.page_id.is_empty()
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => parse_value(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
