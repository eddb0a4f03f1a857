//! TF-IDF vector space fitted on page corpora.
//!
//! A [`TfidfVectorizer`] only exists once it has been fitted, so every vector
//! it produces belongs to a vocabulary built from pages alone. Query corpora are
//! projected into that space and never extend it.

use std::collections::{HashMap, HashSet};

/// Fitted term set with document frequencies and smoothed IDF weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    document_frequency: Vec<usize>,
    idf: Vec<f64>,
    documents: usize,
}

impl Vocabulary {
    /// Number of distinct terms (vector dimension).
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True when no corpus contributed a term.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in dimension order (first-seen order across the fit corpora).
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Dimension assigned to `term`.
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Number of fit corpora containing `term`.
    pub fn document_frequency(&self, term: &str) -> Option<usize> {
        self.index_of(term).map(|idx| self.document_frequency[idx])
    }

    /// Smoothed inverse document frequency of `term`.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.index_of(term).map(|idx| self.idf[idx])
    }

    /// Number of corpora the vocabulary was fitted on.
    pub fn documents(&self) -> usize {
        self.documents
    }
}

/// TF-IDF projector bound to a page-fitted [`Vocabulary`].
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: Vocabulary,
}

impl TfidfVectorizer {
    /// Builds the vocabulary from whitespace-separated terms of `corpora`.
    ///
    /// IDF is `ln((1 + n) / (1 + df)) + 1`, which stays positive even for a
    /// term present in every corpus.
    pub fn fit<S: AsRef<str>>(corpora: &[S]) -> Self {
        let mut terms: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();

        for corpus in corpora {
            let mut seen: HashSet<usize> = HashSet::new();
            for term in corpus.as_ref().split_whitespace() {
                let idx = match index.get(term) {
                    Some(&idx) => idx,
                    None => {
                        let idx = terms.len();
                        terms.push(term.to_string());
                        index.insert(term.to_string(), idx);
                        document_frequency.push(0);
                        idx
                    }
                };
                if seen.insert(idx) {
                    document_frequency[idx] += 1;
                }
            }
        }

        let documents = corpora.len();
        let n = documents as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Self {
            vocabulary: Vocabulary {
                terms,
                index,
                document_frequency,
                idf,
                documents,
            },
        }
    }

    /// The fitted vocabulary.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Projects one corpus: raw counts × IDF, L2-normalized. Terms outside the
    /// vocabulary are ignored; an empty corpus yields the zero vector.
    pub fn transform_one(&self, corpus: &str) -> Vec<f64> {
        let mut vector = vec![0.0f64; self.dimension()];
        for term in corpus.split_whitespace() {
            if let Some(idx) = self.vocabulary.index_of(term) {
                vector[idx] += 1.0;
            }
        }
        for (weight, idf) in vector.iter_mut().zip(&self.vocabulary.idf) {
            *weight *= idf;
        }
        l2_normalize(&mut vector);
        vector
    }

    /// Projects every corpus, one row per input.
    pub fn transform<S: AsRef<str>>(&self, corpora: &[S]) -> Vec<Vec<f64>> {
        corpora
            .iter()
            .map(|corpus| self.transform_one(corpus.as_ref()))
            .collect()
    }
}

fn l2_normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn norm(vector: &[f64]) -> f64 {
        vector.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[test]
    fn fit_collects_terms_in_first_seen_order() {
        let vectorizer = TfidfVectorizer::fit(&["buy red widget", "buy blue gizmo buy"]);
        let vocabulary = vectorizer.vocabulary();
        assert_eq!(
            vocabulary.terms(),
            &["buy", "red", "widget", "blue", "gizmo"].map(String::from)
        );
        assert_eq!(vocabulary.document_frequency("buy"), Some(2));
        assert_eq!(vocabulary.document_frequency("gizmo"), Some(1));
        assert_eq!(vocabulary.documents(), 2);
    }

    #[test]
    fn idf_is_smoothed_and_positive() {
        let vectorizer = TfidfVectorizer::fit(&["a b", "a"]);
        let vocabulary = vectorizer.vocabulary();
        let common = vocabulary.idf("a").unwrap();
        let rare = vocabulary.idf("b").unwrap();
        assert!((common - 1.0).abs() < 1e-12);
        assert!((rare - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
        assert!(rare > common);
    }

    #[test]
    fn rows_are_unit_length() {
        let vectorizer = TfidfVectorizer::fit(&["buy red widget", "buy blue gizmo"]);
        for row in vectorizer.transform(&["buy red widget", "red red blue"]) {
            assert!((norm(&row) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_corpus_is_zero_vector_of_vocabulary_size() {
        let vectorizer = TfidfVectorizer::fit(&["buy red widget"]);
        let vector = vectorizer.transform_one("");
        assert_eq!(vector.len(), 3);
        assert!(vector.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn unknown_terms_carry_no_weight_and_do_not_grow_vocabulary() {
        let vectorizer = TfidfVectorizer::fit(&["buy red widget"]);
        let vector = vectorizer.transform_one("never scraped");
        assert_eq!(vector.len(), 3);
        assert!(vector.iter().all(|&v| v == 0.0));
        assert_eq!(vectorizer.dimension(), 3);
        assert_eq!(vectorizer.vocabulary().index_of("never"), None);
    }

    #[test]
    fn term_frequency_raises_weight() {
        let vectorizer = TfidfVectorizer::fit(&["red blue", "green"]);
        let vector = vectorizer.transform_one("red red blue");
        let red = vectorizer.vocabulary().index_of("red").unwrap();
        let blue = vectorizer.vocabulary().index_of("blue").unwrap();
        assert!((vector[red] / vector[blue] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn adding_a_page_changes_vocabulary() {
        let before = TfidfVectorizer::fit(&["buy red widget"]);
        let after = TfidfVectorizer::fit(&["buy red widget", "cheap gizmo"]);
        assert_ne!(before.vocabulary(), after.vocabulary());
        assert_eq!(after.vocabulary().index_of("gizmo"), Some(4));
    }
}
