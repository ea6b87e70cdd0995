//! Embedding-based semantic scoring.
//!
//! Embeddings come from the configured [`InferenceProvider`] and are cached
//! in a [`TtlCache`] keyed by a SHA-256 digest of `(model, text)`, so a
//! document is only re-embedded when its content or the model changes.
//!
//! Provider failures never propagate. A failed query embedding makes the
//! scorer unavailable for that search, as does every document embedding
//! failing; a single failed document embedding scores that document `0.0`.

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::inference::{cosine_similarity, InferenceProvider};

/// Cached embedding vectors, shared read-mostly across searches.
pub type EmbeddingCache = TtlCache<Arc<Vec<f32>>>;

/// Embeddings are keyed by content, so they only expire to bound memory.
pub const EMBEDDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache key for an embedding: hex SHA-256 over model and text.
pub fn embedding_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cosine similarity clamped to `[0, 1]` for fusion.
pub fn semantic_similarity(query: &[f32], doc: &[f32]) -> f64 {
    (cosine_similarity(query, doc) as f64).clamp(0.0, 1.0)
}

/// The first `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct SemanticScorer {
    provider: Arc<dyn InferenceProvider>,
    cache: Arc<EmbeddingCache>,
    max_chars: usize,
}

impl SemanticScorer {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        cache: Arc<EmbeddingCache>,
        max_chars: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            max_chars: max_chars.max(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed `text`, reusing a cached vector when present.
    pub async fn embed(&self, text: &str) -> anyhow::Result<Arc<Vec<f32>>> {
        let text = truncate_chars(text, self.max_chars);
        let key = embedding_key(self.provider.model_name(), text);
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }
        let vector = Arc::new(self.provider.embed(text).await?);
        self.cache.put(key, Arc::clone(&vector), EMBEDDING_TTL);
        Ok(vector)
    }

    /// Embed the query, or `None` when the provider is off or failing.
    pub async fn embed_query(&self, query: &str) -> Option<Arc<Vec<f32>>> {
        if !self.is_available() {
            return None;
        }
        match self.embed(query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed; semantic scoring disabled for this search");
                None
            }
        }
    }

    /// Similarity of each `(path, content)` to the query vector.
    ///
    /// Runs up to `concurrency` embeddings at once. Documents whose
    /// embedding fails score `0.0`. Returns `None` when no document could
    /// be embedded at all, which callers treat as the scorer being down.
    pub async fn score_documents<I>(
        &self,
        query: &[f32],
        docs: I,
        concurrency: usize,
    ) -> Option<HashMap<String, f64>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let scored: Vec<(String, Option<f64>)> = stream::iter(docs)
            .map(|(path, content)| async move {
                let score = match self.embed(&content).await {
                    Ok(vector) => Some(semantic_similarity(query, &vector)),
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "document embedding failed");
                        None
                    }
                };
                (path, score)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        if !scored.is_empty() && scored.iter().all(|(_, score)| score.is_none()) {
            tracing::warn!(
                documents = scored.len(),
                "every document embedding failed; semantic scoring disabled for this search"
            );
            return None;
        }
        Some(
            scored
                .into_iter()
                .map(|(path, score)| (path, score.unwrap_or(0.0)))
                .collect(),
        )
    }
}
