//! Tokenization and BM25 lexical scoring.
//!
//! ```text
//!                          tf · (k1 + 1)
//! score = Σ idf(t) · ─────────────────────────────────
//!         t∈q         tf + k1 · (1 − b + b · |d| / avgdl)
//!
//! idf(t) = ln(1 + (N − df + 0.5) / (df + 0.5))
//! ```
//!
//! When no corpus statistics are available, `idf` falls back to
//! [`IDF_SMOOTHING`].

use std::collections::{HashMap, HashSet};

/// `idf` used when the corpus is unknown.
pub const IDF_SMOOTHING: f64 = 1.0;

/// Byte ranges of alphanumeric runs in `text`.
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            spans.push((s, idx));
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Lowercase alphanumeric tokens, in document order.
pub fn tokenize(text: &str) -> Vec<String> {
    word_spans(text)
        .into_iter()
        .map(|(s, e)| text[s..e].to_lowercase())
        .collect()
}

/// Distinct query terms in first-occurrence order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Term counts for one document.
#[derive(Debug, Clone, Default)]
pub struct TermFrequencies {
    counts: HashMap<String, usize>,
    len: usize,
}

impl TermFrequencies {
    pub fn from_tokens(tokens: &[String]) -> Self {
        let mut counts = HashMap::new();
        for t in tokens {
            *counts.entry(t.clone()).or_insert(0) += 1;
        }
        Self {
            counts,
            len: tokens.len(),
        }
    }

    pub fn tf(&self, term: &str) -> usize {
        self.counts.get(term).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn terms(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}

/// Document frequencies and average length over a corpus.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    pub doc_count: usize,
    pub avg_len: f64,
    doc_freq: HashMap<String, usize>,
}

impl CorpusStats {
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a TermFrequencies>) -> Self {
        let mut doc_count = 0usize;
        let mut total_len = 0usize;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            doc_count += 1;
            total_len += doc.len();
            for term in doc.terms() {
                *doc_freq.entry(term.to_string()).or_insert(0) += 1;
            }
        }
        let avg_len = if doc_count == 0 {
            0.0
        } else {
            total_len as f64 / doc_count as f64
        };
        Self {
            doc_count,
            avg_len,
            doc_freq,
        }
    }

    pub fn idf(&self, term: &str) -> f64 {
        if self.doc_count == 0 {
            return IDF_SMOOTHING;
        }
        let n = self.doc_count as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

/// BM25 tuning constants.
#[derive(Debug, Clone, Copy)]
pub struct Bm25 {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength in `[0, 1]`.
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25 {
    /// Score a document against distinct query terms. Zero when no term matches.
    pub fn score(&self, terms: &[String], doc: &TermFrequencies, stats: &CorpusStats) -> f64 {
        let avg_len = if stats.avg_len > 0.0 {
            stats.avg_len
        } else {
            doc.len().max(1) as f64
        };
        let len_norm = 1.0 - self.b + self.b * doc.len() as f64 / avg_len;

        terms
            .iter()
            .map(|term| {
                let tf = doc.tf(term) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                stats.idf(term) * tf * (self.k1 + 1.0) / (tf + self.k1 * len_norm)
            })
            .sum()
    }
}
