//! Keyword toxicity

use super::ToxicityScorer;
use crate::domain::MAX_SCORE;

/// Terms counted by the default scorer
pub const DEFAULT_TOXIC_TERMS: &[&str] = &["fuck", "shit", "damn", "hate", "stupid", "idiot"];

/// Local keyword heuristic.
///
/// Counts the distinct terms found (as substrings) in the lowercased text
/// and scales by the whitespace token count: `min(10, terms / tokens * 10)`.
/// A term repeated in the text counts once. Empty text scores 0.
#[derive(Debug, Clone)]
pub struct KeywordToxicity {
    terms: Vec<String>,
}

impl KeywordToxicity {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordToxicity {
    fn default() -> Self {
        Self::new(DEFAULT_TOXIC_TERMS)
    }
}

impl ToxicityScorer for KeywordToxicity {
    fn score(&self, text: &str) -> f64 {
        let text = text.to_lowercase();
        let tokens = text.split_whitespace().count();
        if tokens == 0 {
            return 0.0;
        }

        let matches = self
            .terms
            .iter()
            .filter(|term| text.contains(term.as_str()))
            .count();

        (matches as f64 / tokens as f64 * MAX_SCORE).min(MAX_SCORE)
    }
}
