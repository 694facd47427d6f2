//! Domain records shared across the workspace.

use serde::{Deserialize, Serialize};

/// One question/answer pair in the catalog.
///
/// Entries are immutable after load; identity is their position in the
/// corpus sequence, which stays stable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    /// Topic bucket (science, geography, ...). Informational only; the
    /// matcher scores across the whole corpus regardless of category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl QaEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: None,
        }
    }

    pub fn with_category(
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: Some(category.into()),
        }
    }
}

/// Outcome of matching one query against the corpus.
///
/// `matched_question` is present exactly when `confidence > 0`; a
/// below-threshold query yields the fallback answer with confidence 0
/// and no matched question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub answer: String,
    /// Cosine similarity scaled to 0-100, rounded to 2 decimal places.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_question: Option<String>,
}

impl MatchResult {
    /// Whether this result carries an actual corpus match rather than
    /// the fallback answer.
    pub fn is_match(&self) -> bool {
        self.confidence > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_constructors() {
        let plain = QaEntry::new("Q?", "A.");
        assert_eq!(plain.question, "Q?");
        assert!(plain.category.is_none());

        let tagged = QaEntry::with_category("Q?", "A.", "science");
        assert_eq!(tagged.category.as_deref(), Some("science"));
    }

    #[test]
    fn test_match_result_serializes_without_null_question() {
        let fallback = MatchResult {
            answer: "no idea".into(),
            confidence: 0.0,
            matched_question: None,
        };
        let json = serde_json::to_string(&fallback).unwrap();
        assert!(!json.contains("matched_question"));
        assert!(!fallback.is_match());
    }
}
