//! Wiring: builds the shared transport, caches, search engine, and
//! dispatcher from a [`Config`].
//!
//! ```text
//! Dispatcher ─▶ ToolContext ─┬─▶ VaultClient ─▶ ResilientTransport ─▶ VaultBackend
//!                            ├─▶ SearchEngine ─┬─▶ VaultClient
//!                            │                 └─▶ SemanticScorer ─▶ InferenceProvider
//!                            └─▶ InferenceProvider
//! ```
//!
//! One rate limiter and one response cache serve every vault call; one
//! embedding cache serves every search.

use anyhow::Result;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::inference::{create_provider, InferenceProvider};
use crate::rate_limit::RateLimiter;
use crate::search::semantic::{EmbeddingCache, SemanticScorer};
use crate::search::{PathFilter, SearchEngine};
use crate::tools::{Dispatcher, ToolContext, ToolRegistry};
use crate::transport::{HttpBackend, ResilientTransport, RetryPolicy, VaultBackend};
use crate::vault::VaultClient;

/// A fully assembled gateway.
pub struct Gateway {
    dispatcher: Dispatcher,
    transport: Arc<ResilientTransport>,
}

impl Gateway {
    /// Build against the real vault and the configured inference provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.vault, &config.transport)?);
        let provider = create_provider(&config.inference)?;
        Self::with_parts(config, backend, provider, ToolRegistry::with_builtins())
    }

    /// Build from explicit collaborators.
    pub fn with_parts(
        config: &Config,
        backend: Arc<dyn VaultBackend>,
        provider: Arc<dyn InferenceProvider>,
        registry: ToolRegistry,
    ) -> Result<Self> {
        let transport = Arc::new(ResilientTransport::new(
            backend,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            Arc::new(ResponseCache::new(config.cache.max_entries)),
            config.cache.ttl(),
            RetryPolicy::from_config(&config.transport),
        ));
        let vault = VaultClient::new(Arc::clone(&transport));

        let semantic = SemanticScorer::new(
            Arc::clone(&provider),
            Arc::new(EmbeddingCache::new(config.cache.embedding_max_entries)),
            config.inference.max_embed_chars,
        );
        let engine = SearchEngine::new(
            vault.clone(),
            semantic,
            config.retrieval.clone(),
            PathFilter::from_config(&config.vault)?,
            config.vault.max_documents,
        );

        let ctx = Arc::new(ToolContext::new(vault, Arc::new(engine), provider));
        let dispatcher = registry.build(ctx, config.dispatch.timeout());

        tracing::debug!(
            tools = dispatcher.catalog().len(),
            provider = dispatcher.context().inference.model_name(),
            "gateway assembled"
        );
        Ok(Self {
            dispatcher,
            transport,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::DisabledProvider;
    use crate::tools::ToolInvocationRequest;
    use crate::vault::memory::MemoryVault;
    use serde_json::json;

    #[tokio::test]
    async fn test_assembled_gateway_serves_builtins() {
        let vault = Arc::new(MemoryVault::with_documents([("a.md", "hello")]));
        let gateway = Gateway::with_parts(
            &Config::default(),
            vault,
            Arc::new(DisabledProvider),
            ToolRegistry::with_builtins(),
        )
        .unwrap();

        assert_eq!(gateway.dispatcher().catalog().len(), 8);
        let result = gateway
            .dispatcher()
            .dispatch(ToolInvocationRequest::new("read_note", json!({"path": "a.md"})))
            .await;
        assert!(result.success, "{:?}", result);
        assert_eq!(result.data["content"], "hello");
        assert_eq!(gateway.transport().cache().len(), 1);
    }

    #[test]
    fn test_bad_globs_fail_assembly() {
        let mut config = Config::default();
        config.vault.include_globs = vec!["[".to_string()];
        let result = Gateway::with_parts(
            &config,
            Arc::new(MemoryVault::new()),
            Arc::new(DisabledProvider),
            ToolRegistry::new(),
        );
        assert!(result.is_err());
    }
}
