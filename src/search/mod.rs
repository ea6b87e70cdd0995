//! Hybrid search over vault documents.
//!
//! A search walks the vault (honouring include/exclude globs and an optional
//! folder), reads candidate documents concurrently through the shared
//! transport, scores each one three ways, and fuses the scores:
//!
//! | Scorer | Module | Range |
//! |--------|--------|-------|
//! | BM25 lexical | [`lexical`] | `[0, ∞)`, min-max normalised before fusion |
//! | Embedding cosine | [`semantic`] | `[0, 1]` |
//! | Term proximity | [`proximity`] | `[0, 1]` |
//!
//! # Modes
//!
//! | Mode | Candidates | Weights |
//! |------|-----------|---------|
//! | `keyword` | lexical match | lexical + proximity |
//! | `semantic` | semantic ≥ `min_semantic_score` | semantic only |
//! | `hybrid` | either | all three |
//!
//! When embeddings are unavailable (provider disabled or failing), semantic
//! and hybrid searches fall back to lexical + proximity and the response is
//! flagged `degraded`. They never fail because of the provider.
//!
//! # Determinism
//!
//! Results are ordered by fused score descending, then path ascending.
//! Identical inputs always produce the identical list.

pub mod fusion;
pub mod lexical;
pub mod proximity;
pub mod semantic;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{RetrievalConfig, VaultConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::vault::VaultClient;
use fusion::{rank, FusionWeights, ScoreExplanation, ScoredCandidate};
use lexical::{query_terms, word_spans, Bm25, CorpusStats, TermFrequencies};
use proximity::proximity_score;
use semantic::SemanticScorer;

/// Which scorers take part in a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub const ALL: [&'static str; 3] = ["keyword", "semantic", "hybrid"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: '{}'. Must be keyword, semantic, or hybrid.",
                other
            ),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed query, built once per search.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw_query: String,
    /// Distinct lowercase tokens in first-occurrence order.
    pub normalized_terms: Vec<String>,
    /// Present only when semantic scoring is possible for this search.
    pub query_embedding: Option<Arc<Vec<f32>>>,
}

impl QueryContext {
    pub fn new(raw_query: &str) -> Self {
        Self {
            raw_query: raw_query.to_string(),
            normalized_terms: query_terms(raw_query),
            query_embedding: None,
        }
    }
}

/// Parameters for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Defaults to `retrieval.mode`.
    pub mode: Option<SearchMode>,
    /// Defaults to `retrieval.final_limit`.
    pub limit: Option<usize>,
    /// Restrict the walk to this vault folder.
    pub folder: Option<String>,
    /// Attach a [`ScoreExplanation`] to each result.
    pub explain: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// One ranked hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub path: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Ranked hits plus how they were produced.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    /// True when embeddings were wanted but unavailable.
    pub degraded: bool,
    pub results: Vec<SearchResult>,
}

/// A document loaded for scoring.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub content: String,
    tokens: Vec<String>,
    tf: TermFrequencies,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = lexical::tokenize(&content);
        let tf = TermFrequencies::from_tokens(&tokens);
        Self {
            path: path.into(),
            content,
            tokens,
            tf,
        }
    }
}

/// Include/exclude glob filter over vault-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        Self::new(&config.include_globs, &config.exclude_globs)
    }

    pub fn accepts(&self, path: &str) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Scores and ranks loaded documents from precomputed semantic scores.
pub struct Ranker<'a> {
    pub config: &'a RetrievalConfig,
    pub weights: FusionWeights,
}

impl<'a> Ranker<'a> {
    pub fn new(config: &'a RetrievalConfig) -> Self {
        Self {
            config,
            weights: FusionWeights::from_config(config),
        }
    }

    /// Score `docs` for `query` and return the top `limit` candidates with
    /// the weights used.
    ///
    /// `semantic_scores` is `None` when the semantic scorer is unavailable.
    pub fn rank_documents(
        &self,
        query: &QueryContext,
        docs: &[Document],
        semantic_scores: Option<&HashMap<String, f64>>,
        mode: SearchMode,
        limit: usize,
    ) -> (Vec<ScoredCandidate>, FusionWeights) {
        let semantic_available = semantic_scores.is_some();
        let weights = self.weights.effective(mode, semantic_available);
        let bm25 = Bm25 {
            k1: self.config.bm25_k1,
            b: self.config.bm25_b,
        };
        let stats = CorpusStats::from_documents(docs.iter().map(|d| &d.tf));
        let terms = &query.normalized_terms;

        let candidates: Vec<ScoredCandidate> = docs
            .iter()
            .filter_map(|doc| {
                let lexical = bm25.score(terms, &doc.tf, &stats);
                let semantic = semantic_scores
                    .and_then(|s| s.get(&doc.path).copied())
                    .unwrap_or(0.0);
                let lexical_match = lexical > 0.0;
                let semantic_match =
                    semantic_available && semantic >= self.config.min_semantic_score;

                let candidate = match mode {
                    SearchMode::Keyword => lexical_match,
                    SearchMode::Semantic if semantic_available => semantic_match,
                    SearchMode::Semantic => lexical_match,
                    SearchMode::Hybrid => lexical_match || semantic_match,
                };
                if !candidate {
                    return None;
                }

                let proximity = proximity_score(&doc.tokens, terms);
                Some(ScoredCandidate::new(&doc.path, lexical, semantic, proximity))
            })
            .collect();

        (rank(candidates, &weights, limit), weights)
    }
}

/// Hybrid search over the vault.
pub struct SearchEngine {
    vault: VaultClient,
    semantic: SemanticScorer,
    config: RetrievalConfig,
    filter: PathFilter,
    max_documents: usize,
}

impl SearchEngine {
    pub fn new(
        vault: VaultClient,
        semantic: SemanticScorer,
        config: RetrievalConfig,
        filter: PathFilter,
        max_documents: usize,
    ) -> Self {
        Self {
            vault,
            semantic,
            config,
            filter,
            max_documents,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn default_mode(&self) -> SearchMode {
        self.config.mode.parse().unwrap_or(SearchMode::Hybrid)
    }

    /// Run a search.
    ///
    /// Fails only when the query is blank or the vault listing itself is
    /// unreachable. Unreadable documents are skipped.
    pub async fn search(&self, request: &SearchRequest) -> GatewayResult<SearchResponse> {
        if request.query.trim().is_empty() {
            return Err(GatewayError::invalid("query must not be empty"));
        }
        let mode = request.mode.unwrap_or_else(|| self.default_mode());
        let limit = request.limit.unwrap_or(self.config.final_limit);

        let mut query = QueryContext::new(&request.query);
        let docs = self.load_corpus(request.folder.as_deref()).await?;

        if mode != SearchMode::Keyword {
            query.query_embedding = self.semantic.embed_query(&query.raw_query).await;
        }
        let semantic_scores = match &query.query_embedding {
            Some(q) => {
                let owned: Vec<(String, String)> = docs
                    .iter()
                    .map(|d| (d.path.clone(), d.content.clone()))
                    .collect();
                self.semantic
                    .score_documents(q, owned, self.config.concurrency)
                    .await
            }
            None => None,
        };
        let semantic_available = semantic_scores.is_some();
        let degraded = mode != SearchMode::Keyword && !semantic_available;

        let (ranked, weights) = Ranker::new(&self.config).rank_documents(
            &query,
            &docs,
            semantic_scores.as_ref(),
            mode,
            limit,
        );

        tracing::debug!(
            query = %query.raw_query,
            %mode,
            degraded,
            corpus = docs.len(),
            hits = ranked.len(),
            "search ranked"
        );

        let results = ranked
            .iter()
            .map(|candidate| {
                let content = docs
                    .iter()
                    .find(|d| d.path == candidate.document_path)
                    .map(|d| d.content.as_str())
                    .unwrap_or_default();
                SearchResult {
                    path: candidate.document_path.clone(),
                    score: candidate.fused_score,
                    snippet: snippet(content, &query.normalized_terms, self.config.snippet_chars),
                    explain: request
                        .explain
                        .then(|| ScoreExplanation::new(candidate, &weights, semantic_available)),
                }
            })
            .collect();

        Ok(SearchResponse {
            mode,
            degraded,
            results,
        })
    }

    /// Walk and read candidate documents, sorted by path.
    async fn load_corpus(&self, folder: Option<&str>) -> GatewayResult<Vec<Document>> {
        let paths = self
            .vault
            .walk_files(folder, |p| self.filter.accepts(p), self.max_documents)
            .await?;

        let vault = &self.vault;
        let mut docs: Vec<Document> = stream::iter(paths)
            .map(|path| async move {
                let content = vault.read_document(&path).await;
                (path, content)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|(path, content)| async move {
                match content {
                    Ok(text) => Some(Document::new(path, text)),
                    Err(e) => {
                        tracing::warn!(%path, error = %e, "skipping unreadable document");
                        None
                    }
                }
            })
            .collect()
            .await;

        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }
}

/// A window of about `max_chars` characters around the first query-term
/// hit, or the document head when no term occurs. `None` for blank text.
pub fn snippet(content: &str, terms: &[String], max_chars: usize) -> Option<String> {
    if content.trim().is_empty() || max_chars == 0 {
        return None;
    }

    let hit_byte = word_spans(content)
        .into_iter()
        .find(|&(s, e)| terms.iter().any(|t| *t == content[s..e].to_lowercase()))
        .map(|(s, _)| s)
        .unwrap_or(0);
    let hit_char = content[..hit_byte].chars().count();
    let start = hit_char.saturating_sub(max_chars / 4);

    let total = content.chars().count();
    let body: String = content
        .chars()
        .skip(start)
        .take(max_chars)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let body = body.trim();

    let mut out = String::with_capacity(body.len() + 6);
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(body);
    if start + max_chars < total {
        out.push_str("...");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[(&str, &str)]) -> Vec<Document> {
        items.iter().map(|(p, c)| Document::new(*p, *c)).collect()
    }

    fn ranked_paths(candidates: &[ScoredCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.document_path.as_str()).collect()
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert_eq!(SearchMode::Keyword.to_string(), "keyword");
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_path_filter() {
        let filter =
            PathFilter::new(&["**/*.md".to_string()], &["archive/**".to_string()]).unwrap();
        assert!(filter.accepts("a.md"));
        assert!(filter.accepts("notes/b.md"));
        assert!(!filter.accepts("img.png"));
        assert!(!filter.accepts("archive/old.md"));
        assert!(PathFilter::new(&["[".to_string()], &[]).is_err());
    }

    #[test]
    fn test_term_frequency_and_window_rank_first() {
        let long_tail = "lorem ipsum dolor sit amet ".repeat(60);
        let corpus = docs(&[
            ("dense.md", "rust notes: rust ownership and rust traits"),
            ("sparse.md", &format!("{} rust", long_tail)),
            ("other.md", "python notes"),
        ]);
        let config = RetrievalConfig::default();
        let (ranked, _) = Ranker::new(&config).rank_documents(
            &QueryContext::new("rust"),
            &corpus,
            None,
            SearchMode::Hybrid,
            10,
        );
        assert_eq!(ranked_paths(&ranked), vec!["dense.md", "sparse.md"]);
    }

    #[test]
    fn test_semantic_only_candidates_join_in_hybrid() {
        let corpus = docs(&[("lex.md", "rust"), ("sem.md", "ferris crab")]);
        let config = RetrievalConfig::default();
        let semantic = HashMap::from([
            ("lex.md".to_string(), 0.1),
            ("sem.md".to_string(), 0.9),
        ]);
        let ranker = Ranker::new(&config);
        let query = QueryContext::new("rust");

        let (hybrid, _) =
            ranker.rank_documents(&query, &corpus, Some(&semantic), SearchMode::Hybrid, 10);
        assert_eq!(hybrid.len(), 2);

        let (keyword, _) =
            ranker.rank_documents(&query, &corpus, Some(&semantic), SearchMode::Keyword, 10);
        assert_eq!(ranked_paths(&keyword), vec!["lex.md"]);

        let (sem, weights) =
            ranker.rank_documents(&query, &corpus, Some(&semantic), SearchMode::Semantic, 10);
        assert_eq!(ranked_paths(&sem), vec!["sem.md"]);
        assert_eq!(weights.semantic, 1.0);
    }

    #[test]
    fn test_semantic_mode_degrades_to_lexical() {
        let corpus = docs(&[("a.md", "rust"), ("b.md", "go")]);
        let config = RetrievalConfig::default();
        let (ranked, weights) = Ranker::new(&config).rank_documents(
            &QueryContext::new("rust"),
            &corpus,
            None,
            SearchMode::Semantic,
            10,
        );
        assert_eq!(ranked_paths(&ranked), vec!["a.md"]);
        assert_eq!(weights.semantic, 0.0);
    }

    #[test]
    fn test_limit_truncates() {
        let corpus = docs(&[("a.md", "rust"), ("b.md", "rust"), ("c.md", "rust")]);
        let config = RetrievalConfig::default();
        let (ranked, _) = Ranker::new(&config).rank_documents(
            &QueryContext::new("rust"),
            &corpus,
            None,
            SearchMode::Keyword,
            2,
        );
        assert_eq!(ranked_paths(&ranked), vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_snippet_centres_on_first_hit() {
        let text = format!("{}Rust is here{}", "x ".repeat(100), " y".repeat(100));
        let terms = vec!["rust".to_string()];
        let s = snippet(&text, &terms, 40).unwrap();
        assert!(s.starts_with("..."));
        assert!(s.ends_with("..."));
        assert!(s.contains("Rust is here"));
    }

    #[test]
    fn test_snippet_short_and_blank() {
        let terms = vec!["rust".to_string()];
        assert_eq!(snippet("rust\nrocks", &terms, 100).as_deref(), Some("rust rocks"));
        assert!(snippet("   ", &terms, 100).is_none());
        // multi-byte text never splits a char
        assert!(snippet(&"é".repeat(50), &terms, 10).is_some());
    }
}
