use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    #[serde(default = "default_vault_url")]
    pub base_url: String,
    /// Environment variable holding the bearer credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    /// The vault's REST plugin ships a self-signed certificate.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_url: default_vault_url(),
            api_key_env: default_api_key_env(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_documents: default_max_documents(),
            accept_invalid_certs: false,
        }
    }
}

fn default_vault_url() -> String {
    "https://127.0.0.1:27124/".to_string()
}
fn default_api_key_env() -> String {
    "VAULT_API_KEY".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_max_documents() -> usize {
    500
}

impl VaultConfig {
    /// Read the bearer credential from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    2000
}
fn default_jitter_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

fn default_capacity() -> u32 {
    10
}
fn default_refill_per_sec() -> f64 {
    5.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_embedding_max_entries")]
    pub embedding_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            embedding_max_entries: default_embedding_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30
}
fn default_max_entries() -> usize {
    1024
}
fn default_embedding_max_entries() -> usize {
    4096
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_inference_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
    /// Document text beyond this many characters is not embedded.
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_inference_url(),
            embed_model: default_embed_model(),
            completion_model: default_completion_model(),
            timeout_secs: default_inference_timeout_secs(),
            max_embed_chars: default_max_embed_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_inference_url() -> String {
    "http://127.0.0.1:11434/".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_completion_model() -> String {
    "llama3".to_string()
}
fn default_inference_timeout_secs() -> u64 {
    30
}
fn default_max_embed_chars() -> usize {
    4000
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_proximity_weight")]
    pub proximity_weight: f64,
    #[serde(default = "default_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_b")]
    pub bm25_b: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_min_semantic_score")]
    pub min_semantic_score: f64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            lexical_weight: default_lexical_weight(),
            semantic_weight: default_semantic_weight(),
            proximity_weight: default_proximity_weight(),
            bm25_k1: default_k1(),
            bm25_b: default_b(),
            final_limit: default_final_limit(),
            min_semantic_score: default_min_semantic_score(),
            snippet_chars: default_snippet_chars(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_lexical_weight() -> f64 {
    0.5
}
fn default_semantic_weight() -> f64 {
    0.3
}
fn default_proximity_weight() -> f64 {
    0.2
}
fn default_k1() -> f64 {
    1.2
}
fn default_b() -> f64 {
    0.75
}
fn default_final_limit() -> usize {
    10
}
fn default_min_semantic_score() -> f64 {
    0.25
}
fn default_snippet_chars() -> usize {
    160
}
fn default_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_dispatch_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    reqwest::Url::parse(&config.vault.base_url)
        .with_context(|| format!("vault.base_url is not a valid URL: {}", config.vault.base_url))?;

    if config.vault.max_documents == 0 {
        bail!("vault.max_documents must be > 0");
    }

    if config.transport.max_attempts == 0 {
        bail!("transport.max_attempts must be >= 1");
    }
    if config.transport.timeout_secs == 0 {
        bail!("transport.timeout_secs must be > 0");
    }

    if config.rate_limit.capacity == 0 {
        bail!("rate_limit.capacity must be >= 1");
    }
    if !(config.rate_limit.refill_per_sec > 0.0) {
        bail!("rate_limit.refill_per_sec must be > 0");
    }

    if config.cache.max_entries == 0 || config.cache.embedding_max_entries == 0 {
        bail!("cache entry caps must be > 0");
    }

    let r = &config.retrieval;
    match r.mode.as_str() {
        "keyword" | "semantic" | "hybrid" => {}
        other => bail!(
            "Unknown retrieval mode: '{}'. Must be keyword, semantic, or hybrid.",
            other
        ),
    }
    for (name, w) in [
        ("lexical_weight", r.lexical_weight),
        ("semantic_weight", r.semantic_weight),
        ("proximity_weight", r.proximity_weight),
    ] {
        if !(0.0..=1.0).contains(&w) {
            bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }
    let sum = r.lexical_weight + r.semantic_weight + r.proximity_weight;
    if (sum - 1.0).abs() > 1e-6 {
        bail!("retrieval weights must sum to 1.0 (got {})", sum);
    }
    if r.final_limit < 1 {
        bail!("retrieval.final_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.bm25_b) {
        bail!("retrieval.bm25_b must be in [0.0, 1.0]");
    }
    if r.bm25_k1 < 0.0 {
        bail!("retrieval.bm25_k1 must be >= 0");
    }
    if r.concurrency == 0 {
        bail!("retrieval.concurrency must be >= 1");
    }

    match config.inference.provider.as_str() {
        "disabled" => {}
        "ollama" => {
            reqwest::Url::parse(&config.inference.base_url).with_context(|| {
                format!(
                    "inference.base_url is not a valid URL: {}",
                    config.inference.base_url
                )
            })?;
        }
        other => bail!(
            "Unknown inference provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    if config.dispatch.timeout_secs == 0 {
        bail!("dispatch.timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.retrieval.mode, "hybrid");
        assert!(!config.inference.is_enabled());
        assert_eq!(config.vault.include_globs, vec!["**/*.md".to_string()]);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[vault]
base_url = "http://localhost:27123/"

[rate_limit]
capacity = 5
refill_per_sec = 1.0

[retrieval]
lexical_weight = 0.6
semantic_weight = 0.2
proximity_weight = 0.2
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.rate_limit.capacity, 5);
        assert_eq!(config.vault.base_url, "http://localhost:27123/");
        assert!((config.retrieval.lexical_weight - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config: Config = toml::from_str(
            r#"
[retrieval]
lexical_weight = 0.9
semantic_weight = 0.9
proximity_weight = 0.0
"#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config: Config = toml::from_str(
            r#"
[inference]
provider = "magic"
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config: Config = toml::from_str(
            r#"
[rate_limit]
capacity = 0
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Path::new("/nonexistent/vgw.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
