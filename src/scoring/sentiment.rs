//! Sentiment label mapping

/// Score used whenever no usable label is available
pub const NEUTRAL_SENTIMENT: f64 = 5.0;

/// Four-way classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl SentimentLabel {
    /// Case-insensitive label lookup
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Some(Self::Positive),
            "NEGATIVE" => Some(Self::Negative),
            "NEUTRAL" => Some(Self::Neutral),
            "MIXED" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Self::Positive => 8.5,
            Self::Negative => 1.5,
            Self::Neutral | Self::Mixed => NEUTRAL_SENTIMENT,
        }
    }
}

/// Numeric sentiment for a raw label; unrecognized labels are neutral
pub fn sentiment_score(label: &str) -> f64 {
    SentimentLabel::parse(label)
        .map(|l| l.score())
        .unwrap_or(NEUTRAL_SENTIMENT)
}
