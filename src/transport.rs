//! Resilient transport: the single choke point for vault traffic.
//!
//! [`ResilientTransport::fetch`] wraps a [`VaultBackend`] call with the
//! response cache, the shared rate limiter, and a bounded retry policy:
//!
//! 1. `GET`: serve from the cache when a live entry exists.
//! 2. Acquire a rate-limit token (one per network attempt).
//! 3. Send the request; the backend enforces the per-request timeout.
//! 4. Timeouts, connection failures, 408, 429, and 5xx are retried with
//!    exponential backoff (base delay doubling, capped) plus random jitter.
//!    After `max_attempts` the call fails with [`GatewayError::Unavailable`].
//! 5. Any other 4xx fails at once with [`GatewayError::ClientError`];
//!    1xx and 3xx fail at once as [`GatewayError::InternalFailure`].
//! 6. `GET` success populates the cache, unless an invalidation happened
//!    while the request was in flight. Success of a mutating method drops
//!    the cached entries for the path, its descendants, and the listings of
//!    its ancestor directories.
//!
//! Cancellation is by drop: the whole sequence, backoff sleeps included, is
//! one future, so an abandoned request stops at its next `.await`.

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{cache_key, ResponseCache};
use crate::config::{TransportConfig, VaultConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::rate_limit::RateLimiter;

// ============ Backend seam ============

/// One HTTP exchange with the vault, before any policy is applied.
#[derive(Debug, Clone)]
pub struct VaultRequest {
    pub method: Method,
    /// Absolute request path, e.g. `/vault/notes/a.md`.
    pub path: String,
    pub body: Option<String>,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure to complete an exchange at all. All variants are transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Io(String),
}

/// Something that can carry a [`VaultRequest`] to the document store.
///
/// The production implementation is [`HttpBackend`]; tests and demos use
/// [`MemoryVault`](crate::vault::memory::MemoryVault).
#[async_trait]
pub trait VaultBackend: Send + Sync {
    async fn send(&self, request: &VaultRequest) -> Result<RawResponse, TransportFailure>;
}

// ============ HTTP backend ============

/// reqwest-backed vault client with an opaque bearer credential.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Build a backend from configuration.
    ///
    /// The bearer credential is read from the environment variable named by
    /// `vault.api_key_env`; requests are sent without one when it is unset.
    pub fn new(vault: &VaultConfig, transport: &TransportConfig) -> anyhow::Result<Self> {
        Self::with_api_key(vault, transport, vault.api_key())
    }

    pub fn with_api_key(
        vault: &VaultConfig,
        transport: &TransportConfig,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&vault.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(transport.timeout_secs))
            .danger_accept_invalid_certs(vault.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl VaultBackend for HttpBackend {
    async fn send(&self, request: &VaultRequest) -> Result<RawResponse, TransportFailure> {
        // Segment-wise so '#', '?' and spaces in note names are escaped.
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TransportFailure::Io(format!("base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(request.path.trim_start_matches('/').split('/'));

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(ref body) = request.body {
            builder = builder
                .header("Content-Type", "text/markdown")
                .body(body.clone());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Io(err.to_string())
    }
}

// ============ Retry policy ============

/// Exponential backoff with additive random jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Backoff before retry number `retry` (0-indexed), without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff before retry number `retry`, with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Outcome classes for a single attempt.
enum Attempt {
    Success(String),
    Retryable(String),
    Fatal(GatewayError),
}

fn classify(result: Result<RawResponse, TransportFailure>) -> Attempt {
    match result {
        Err(failure) => Attempt::Retryable(failure.to_string()),
        Ok(resp) if (200..300).contains(&resp.status) => Attempt::Success(resp.body),
        Ok(resp) if resp.status == 408 || resp.status == 429 || resp.status >= 500 => {
            Attempt::Retryable(format!("HTTP {}: {}", resp.status, truncate(&resp.body, 200)))
        }
        Ok(resp) if (400..500).contains(&resp.status) => Attempt::Fatal(GatewayError::ClientError {
            status: resp.status,
            message: error_message(&resp.body),
        }),
        Ok(resp) => Attempt::Fatal(GatewayError::InternalFailure(format!(
            "unexpected HTTP {} from vault: {}",
            resp.status,
            truncate(&resp.body, 200)
        ))),
    }
}

/// Pull a readable message out of an error body (`{"message": ...}` or text).
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| truncate(body, 200).to_string())
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============ Transport ============

/// Cached, rate-limited, retrying access to a [`VaultBackend`].
///
/// Cheap to share: wrap in an `Arc` and hand it to every component that
/// talks to the vault.
pub struct ResilientTransport {
    backend: Arc<dyn VaultBackend>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl ResilientTransport {
    pub fn new(
        backend: Arc<dyn VaultBackend>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        ttl: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            limiter,
            cache,
            ttl,
            retry,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute one logical request against the vault.
    pub async fn fetch(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> GatewayResult<String> {
        let is_read = method == Method::GET;
        let key = cache_key(method.as_str(), path);

        if is_read {
            if let Some(hit) = self.cache.get(&key) {
                tracing::debug!(%path, "cache hit");
                return Ok(hit);
            }
        }

        // A write that lands while this read is in flight must win.
        let epoch = self.cache.epoch();
        let request = VaultRequest {
            method: method.clone(),
            path: path.to_string(),
            body,
        };

        let outcome = self.send_with_retry(&request).await;

        match &outcome {
            Ok(body) if is_read => {
                if !self.cache.put_if_epoch(key, body.clone(), self.ttl, epoch) {
                    tracing::debug!(%path, "cache fill skipped; invalidated during fetch");
                }
            }
            // A write that timed out may still have landed.
            Ok(_) | Err(GatewayError::Unavailable(_)) if !is_read => {
                self.invalidate_path(path);
            }
            _ => {}
        }

        outcome
    }

    /// Drop cached reads of `path`, its descendants, and ancestor listings.
    pub fn invalidate_path(&self, path: &str) {
        let removed = self.cache.invalidate(&cache_key(Method::GET.as_str(), path));
        let trimmed = path.trim_end_matches('/');
        let mut ancestors = 0;
        for (idx, _) in trimmed.match_indices('/') {
            if self
                .cache
                .remove(&cache_key(Method::GET.as_str(), &trimmed[..=idx]))
            {
                ancestors += 1;
            }
        }
        tracing::debug!(%path, removed, ancestors, "cache invalidated");
    }

    async fn send_with_retry(&self, request: &VaultRequest) -> GatewayResult<String> {
        let mut last_err = String::new();

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt - 1);
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    attempt = attempt + 1,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err,
                    "retrying vault request"
                );
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire().await;

            match classify(self.backend.send(request).await) {
                Attempt::Success(body) => return Ok(body),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retryable(msg) => last_err = msg,
            }
        }

        Err(GatewayError::Unavailable(format!(
            "vault unavailable after {} attempts: {} {}: {}",
            self.retry.max_attempts, request.method, request.path, last_err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of outcomes, then repeats the last one.
    struct ScriptedBackend {
        script: Mutex<Vec<Result<RawResponse, TransportFailure>>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<RawResponse, TransportFailure>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VaultBackend for ScriptedBackend {
        async fn send(&self, _request: &VaultRequest) -> Result<RawResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn transport(backend: Arc<ScriptedBackend>) -> ResilientTransport {
        ResilientTransport::new(
            backend,
            Arc::new(RateLimiter::new(100, 100.0)),
            Arc::new(ResponseCache::new(64)),
            Duration::from_secs(30),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                jitter: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(TransportFailure::Timeout),
            Ok(RawResponse::new(503, "busy")),
            Ok(RawResponse::new(200, "hello")),
        ]);
        let t = transport(backend.clone());
        let body = t.fetch(Method::GET, "/vault/a.md", None).await.unwrap();
        assert_eq!(body, "hello");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_is_unavailable() {
        let backend = ScriptedBackend::new(vec![Err(TransportFailure::Connect("refused".into()))]);
        let t = transport(backend.clone());
        let err = t.fetch(Method::GET, "/vault/a.md", None).await.unwrap_err();
        assert_eq!(err.category(), "unavailable");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Ok(RawResponse::new(
            404,
            r#"{"errorCode":40400,"message":"Not Found"}"#,
        ))]);
        let t = transport(backend.clone());
        let err = t.fetch(Method::GET, "/vault/missing.md", None).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::ClientError {
                status: 404,
                message: "Not Found".into()
            }
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_is_served_from_cache() {
        let backend = ScriptedBackend::new(vec![Ok(RawResponse::new(200, "cached"))]);
        let t = transport(backend.clone());
        t.fetch(Method::GET, "/vault/a.md", None).await.unwrap();
        t.fetch(Method::GET, "/vault/a.md", None).await.unwrap();
        assert_eq!(backend.calls(), 1);
        assert_eq!(t.cache().hits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_invalidates_path_and_ancestor_listings() {
        let backend = ScriptedBackend::new(vec![Ok(RawResponse::new(200, "x"))]);
        let t = transport(backend.clone());
        t.fetch(Method::GET, "/vault/", None).await.unwrap();
        t.fetch(Method::GET, "/vault/notes/", None).await.unwrap();
        t.fetch(Method::GET, "/vault/notes/a.md", None).await.unwrap();
        t.fetch(Method::GET, "/vault/other.md", None).await.unwrap();
        assert_eq!(t.cache().len(), 4);

        t.fetch(Method::PUT, "/vault/notes/a.md", Some("new".into()))
            .await
            .unwrap();
        assert_eq!(t.cache().len(), 1);
        assert!(t.cache().get("GET /vault/other.md").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_are_never_cached() {
        let backend = ScriptedBackend::new(vec![Ok(RawResponse::new(204, ""))]);
        let t = transport(backend.clone());
        t.fetch(Method::DELETE, "/vault/a.md", None).await.unwrap();
        t.fetch(Method::DELETE, "/vault/a.md", None).await.unwrap();
        assert_eq!(backend.calls(), 2);
        assert!(t.cache().is_empty());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..50 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify(Ok(RawResponse::new(429, ""))),
            Attempt::Retryable(_)
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(502, ""))),
            Attempt::Retryable(_)
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(403, "nope"))),
            Attempt::Fatal(GatewayError::ClientError { status: 403, .. })
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(204, ""))),
            Attempt::Success(_)
        ));
        for status in [101, 302, 304] {
            assert!(matches!(
                classify(Ok(RawResponse::new(status, ""))),
                Attempt::Fatal(GatewayError::InternalFailure(_))
            ));
        }
    }

    /// Reads snapshot the stored note, then take a second to answer.
    struct SlowReadBackend {
        content: Mutex<String>,
    }

    #[async_trait]
    impl VaultBackend for SlowReadBackend {
        async fn send(&self, request: &VaultRequest) -> Result<RawResponse, TransportFailure> {
            if request.method == Method::GET {
                let snapshot = self.content.lock().unwrap().clone();
                tokio::time::sleep(Duration::from_secs(1)).await;
                return Ok(RawResponse::new(200, snapshot));
            }
            *self.content.lock().unwrap() = request.body.clone().unwrap_or_default();
            Ok(RawResponse::new(204, ""))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_in_flight_during_write_is_not_cached() {
        let backend = Arc::new(SlowReadBackend {
            content: Mutex::new("old".to_string()),
        });
        let t = Arc::new(ResilientTransport::new(
            backend,
            Arc::new(RateLimiter::new(100, 100.0)),
            Arc::new(ResponseCache::new(64)),
            Duration::from_secs(30),
            RetryPolicy::default(),
        ));

        let reader = {
            let t = Arc::clone(&t);
            tokio::spawn(async move { t.fetch(Method::GET, "/vault/a.md", None).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        t.fetch(Method::PUT, "/vault/a.md", Some("new".into()))
            .await
            .unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), "old");
        assert_eq!(t.fetch(Method::GET, "/vault/a.md", None).await.unwrap(), "new");
    }
}
