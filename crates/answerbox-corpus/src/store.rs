//! Read-only corpus store.

use answerbox_core::QaEntry;
use rand::seq::SliceRandom;

use crate::builtin;

/// Immutable, in-memory set of question/answer pairs.
///
/// Built once at startup; every view hands out copies or borrows, so
/// the underlying sequence (and with it the matcher's index-to-entry
/// correlation) can never shift underneath a caller.
pub struct CorpusStore {
    entries: Vec<QaEntry>,
}

impl CorpusStore {
    /// Store over the compiled-in catalog.
    pub fn builtin() -> Self {
        Self::new(builtin::catalog())
    }

    /// Store over caller-provided entries. An empty corpus is accepted
    /// here; the matcher rejects it at index-build time.
    pub fn new(entries: Vec<QaEntry>) -> Self {
        Self { entries }
    }

    /// The full corpus, in fixed insertion order.
    pub fn all_entries(&self) -> &[QaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `n` random questions for the suggestion UI, uniform and
    /// without replacement. `n` past the corpus size clamps; order is
    /// whatever the sampler produced.
    pub fn sample_questions(&self, n: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        self.entries
            .choose_multiple(&mut rng, n.min(self.entries.len()))
            .map(|e| e.question.clone())
            .collect()
    }

    /// Curated example questions grouped by topic, for browsing.
    ///
    /// A hand-picked subset, not a projection of the corpus — some
    /// curated phrasings are shortened from their catalog originals.
    pub fn categories(&self) -> Vec<(String, Vec<String>)> {
        builtin::curated_categories()
            .into_iter()
            .map(|(name, questions)| {
                (
                    name.to_string(),
                    questions.into_iter().map(String::from).collect(),
                )
            })
            .collect()
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_store() {
        let store = CorpusStore::builtin();
        assert!(!store.is_empty());
        assert_eq!(store.len(), store.all_entries().len());
    }

    #[test]
    fn test_sample_clamps_to_corpus_size() {
        let store = CorpusStore::builtin();
        let sampled = store.sample_questions(1000);
        assert_eq!(sampled.len(), store.len());

        // Every sampled question is a real corpus question, no repeats
        let known: HashSet<&str> = store
            .all_entries()
            .iter()
            .map(|e| e.question.as_str())
            .collect();
        let distinct: HashSet<&str> = sampled.iter().map(String::as_str).collect();
        assert_eq!(distinct.len(), sampled.len());
        for q in &sampled {
            assert!(known.contains(q.as_str()));
        }
    }

    #[test]
    fn test_sample_small_n() {
        let store = CorpusStore::builtin();
        assert_eq!(store.sample_questions(3).len(), 3);
        assert!(store.sample_questions(0).is_empty());
    }

    #[test]
    fn test_sample_empty_store() {
        let store = CorpusStore::new(Vec::new());
        assert!(store.sample_questions(5).is_empty());
    }

    #[test]
    fn test_categories_deterministic() {
        let store = CorpusStore::builtin();
        let a = store.categories();
        let b = store.categories();
        assert_eq!(a.len(), 4);
        let names: Vec<&str> = a.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Science", "Geography", "History", "Sports"]);
        assert_eq!(
            a.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            b.iter().map(|(n, _)| n).collect::<Vec<_>>()
        );
    }
}
