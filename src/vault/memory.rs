//! In-memory [`VaultBackend`] for tests, demos, and offline runs.
//!
//! Emulates the vault REST dialect over a `BTreeMap` behind
//! `std::sync::RwLock`: directory listings are derived from document paths,
//! missing documents return 404 with the vault's JSON error body.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Method;

use super::VAULT_ROOT;
use crate::transport::{RawResponse, TransportFailure, VaultBackend, VaultRequest};

/// In-memory document store.
pub struct MemoryVault {
    docs: RwLock<BTreeMap<String, String>>,
    requests: AtomicUsize,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Seed with `(path, content)` pairs.
    pub fn with_documents<I, P, C>(docs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let vault = Self::new();
        for (path, content) in docs {
            vault.insert(path, content);
        }
        vault
    }

    /// Write directly, bypassing the request path (and any cache above it).
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.docs_mut().insert(path.into(), content.into());
    }

    /// Read directly, bypassing the request path.
    pub fn get(&self, path: &str) -> Option<String> {
        self.docs().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs().is_empty()
    }

    /// Number of requests served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Serve one request synchronously.
    pub fn handle(&self, request: &VaultRequest) -> RawResponse {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let Some(rel) = request.path.strip_prefix(VAULT_ROOT) else {
            return not_found();
        };

        if rel.is_empty() || rel.ends_with('/') {
            return match request.method {
                Method::GET => self.list(rel),
                _ => RawResponse::new(405, r#"{"errorCode":40500,"message":"Method Not Allowed"}"#),
            };
        }

        match request.method {
            Method::GET => match self.docs().get(rel) {
                Some(content) => RawResponse::new(200, content.clone()),
                None => not_found(),
            },
            Method::PUT => {
                let body = request.body.clone().unwrap_or_default();
                self.docs_mut().insert(rel.to_string(), body);
                RawResponse::new(204, "")
            }
            Method::POST => {
                let body = request.body.clone().unwrap_or_default();
                self.docs_mut()
                    .entry(rel.to_string())
                    .or_default()
                    .push_str(&body);
                RawResponse::new(204, "")
            }
            Method::DELETE => match self.docs_mut().remove(rel) {
                Some(_) => RawResponse::new(204, ""),
                None => not_found(),
            },
            _ => RawResponse::new(405, r#"{"errorCode":40500,"message":"Method Not Allowed"}"#),
        }
    }

    fn list(&self, dir: &str) -> RawResponse {
        let docs = self.docs();
        let mut names = BTreeSet::new();
        for path in docs.keys() {
            let Some(rest) = path.strip_prefix(dir) else {
                continue;
            };
            match rest.split_once('/') {
                Some((sub, _)) => names.insert(format!("{}/", sub)),
                None => names.insert(rest.to_string()),
            };
        }
        if names.is_empty() && !dir.is_empty() {
            return not_found();
        }
        let body = serde_json::json!({ "files": names.into_iter().collect::<Vec<_>>() });
        RawResponse::new(200, body.to_string())
    }

    fn docs(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.docs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn docs_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.docs.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found() -> RawResponse {
    RawResponse::new(404, r#"{"errorCode":40400,"message":"Not Found"}"#)
}

#[async_trait]
impl VaultBackend for MemoryVault {
    async fn send(&self, request: &VaultRequest) -> Result<RawResponse, TransportFailure> {
        Ok(self.handle(request))
    }
}
