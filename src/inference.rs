//! Inference provider abstraction and implementations.
//!
//! Defines the [`InferenceProvider`] trait (text → embedding vector, prompt
//! → completion) and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when no provider is configured.
//! - **[`OllamaProvider`]**: calls a local Ollama server's
//!   `/api/embeddings` and `/api/generate` endpoints.
//!
//! Also provides [`cosine_similarity`] for comparing embedding vectors.
//!
//! Provider failures are ordinary `Err` values. The search engine turns them
//! into a zero semantic contribution; `ask_vault` turns them into an
//! `Unavailable` result.
//!
//! # Provider Selection
//!
//! ```rust
//! # use vault_gateway::config::InferenceConfig;
//! # use vault_gateway::inference::create_provider;
//! let config = InferenceConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::InferenceConfig;

/// An embedding + completion backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Returns the embedding model identifier (e.g. `"nomic-embed-text"`).
    ///
    /// Part of the embedding cache key, so vectors from different models
    /// never mix.
    fn model_name(&self) -> &str;

    /// Whether calls can succeed at all. Disabled providers short-circuit
    /// semantic scoring without logging a failure per query.
    fn is_available(&self) -> bool {
        true
    }

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate free text for a prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ============ Disabled Provider ============

/// A no-op provider that always returns errors.
///
/// Used when `inference.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl InferenceProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Inference provider is disabled")
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Inference provider is disabled")
    }
}

// ============ Ollama Provider ============

/// Provider backed by a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: Url,
    embed_model: String,
    completion_model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid inference.base_url: {}", config.base_url))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            embed_model: config.embed_model.clone(),
            completion_model: config.completion_model.clone(),
        })
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = self.base_url.join(endpoint)?;
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama request to {} failed", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        Ok(response)
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .post(
                "api/embeddings",
                serde_json::json!({ "model": self.embed_model, "prompt": text }),
            )
            .await?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Invalid Ollama response: missing embedding")?;
        if parsed.embedding.is_empty() {
            bail!("Empty embedding response");
        }
        Ok(parsed.embedding)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .post(
                "api/generate",
                serde_json::json!({
                    "model": self.completion_model,
                    "prompt": prompt,
                    "stream": false,
                }),
            )
            .await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Invalid Ollama response: missing response text")?;
        Ok(parsed.response)
    }
}

/// Create the appropriate [`InferenceProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &InferenceConfig) -> Result<Arc<dyn InferenceProvider>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledProvider));
    }
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = DisabledProvider;
        assert!(!provider.is_available());
        assert!(provider.embed("hello").await.is_err());
        assert!(provider.complete("hello").await.is_err());
    }

    #[test]
    fn test_create_provider_by_name() {
        let mut config = InferenceConfig::default();
        assert_eq!(create_provider(&config).unwrap().model_name(), "disabled");

        config.provider = "ollama".to_string();
        assert_eq!(
            create_provider(&config).unwrap().model_name(),
            "nomic-embed-text"
        );

        config.provider = "nope".to_string();
        assert!(create_provider(&config).is_err());
    }
}
