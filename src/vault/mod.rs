//! Client for the remote document store.
//!
//! The vault speaks a small REST dialect:
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | list | `GET /vault/{dir}/` | `{"files": ["a.md", "sub/"]}` |
//! | read | `GET /vault/{path}` | document text |
//! | write | `PUT /vault/{path}` | 2xx |
//! | append | `POST /vault/{path}` | 2xx |
//! | delete | `DELETE /vault/{path}` | 2xx |
//!
//! Every call goes through the shared [`ResilientTransport`], so reads are
//! cached, writes invalidate, and everything is rate limited and retried.

pub mod memory;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::transport::ResilientTransport;

/// Request path prefix for every vault resource.
pub const VAULT_ROOT: &str = "/vault/";

/// Whether a listing entry is a note or a folder.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Last path component (directories keep their trailing `/`).
    pub name: String,
    /// Vault-relative path.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Deserialize)]
struct ListingBody {
    files: Vec<String>,
}

/// Typed operations over the vault REST API.
#[derive(Clone)]
pub struct VaultClient {
    transport: Arc<ResilientTransport>,
}

impl VaultClient {
    pub fn new(transport: Arc<ResilientTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }

    /// List the immediate children of `dir` (the vault root when `None`).
    ///
    /// Entries are ordered by path.
    pub async fn list_documents(&self, dir: Option<&str>) -> GatewayResult<Vec<DocumentEntry>> {
        let dir = normalize_dir_path(dir)?;
        let body = self
            .transport
            .fetch(Method::GET, &resource_path(&dir), None)
            .await?;

        let listing: ListingBody = serde_json::from_str(&body).map_err(|e| {
            GatewayError::InternalFailure(format!("malformed listing for '{}': {}", dir, e))
        })?;

        let mut entries: Vec<DocumentEntry> = listing
            .files
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(|name| {
                let kind = if name.ends_with('/') {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                DocumentEntry {
                    path: format!("{}{}", dir, name),
                    name,
                    kind,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        Ok(entries)
    }

    /// Read a document's text.
    pub async fn read_document(&self, path: &str) -> GatewayResult<String> {
        let path = normalize_file_path(path)?;
        self.transport
            .fetch(Method::GET, &resource_path(&path), None)
            .await
    }

    /// Create or overwrite a document.
    pub async fn write_document(&self, path: &str, content: &str) -> GatewayResult<()> {
        let path = normalize_file_path(path)?;
        self.transport
            .fetch(Method::PUT, &resource_path(&path), Some(content.to_string()))
            .await
            .map(|_| ())
    }

    /// Append text to a document, creating it when absent.
    pub async fn append_document(&self, path: &str, content: &str) -> GatewayResult<()> {
        let path = normalize_file_path(path)?;
        self.transport
            .fetch(Method::POST, &resource_path(&path), Some(content.to_string()))
            .await
            .map(|_| ())
    }

    /// Delete a document.
    pub async fn delete_document(&self, path: &str) -> GatewayResult<()> {
        let path = normalize_file_path(path)?;
        self.transport
            .fetch(Method::DELETE, &resource_path(&path), None)
            .await
            .map(|_| ())
    }

    /// True when `path` can be read; a 404 means absent.
    pub async fn exists(&self, path: &str) -> GatewayResult<bool> {
        match self.read_document(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Breadth-first walk collecting file paths accepted by `include`.
    ///
    /// Stops once `limit` files are collected. The result is sorted.
    pub async fn walk_files<F>(
        &self,
        root: Option<&str>,
        include: F,
        limit: usize,
    ) -> GatewayResult<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(normalize_dir_path(root)?);
        let mut files = Vec::new();

        'walk: while let Some(dir) = queue.pop_front() {
            let dir_opt = if dir.is_empty() { None } else { Some(dir.as_str()) };
            for entry in self.list_documents(dir_opt).await? {
                match entry.kind {
                    EntryKind::Directory => queue.push_back(entry.path),
                    EntryKind::File if include(&entry.path) => {
                        files.push(entry.path);
                        if files.len() >= limit {
                            tracing::debug!(limit, "vault walk reached document cap");
                            break 'walk;
                        }
                    }
                    EntryKind::File => {}
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Request path for a vault-relative path.
pub fn resource_path(relative: &str) -> String {
    format!("{}{}", VAULT_ROOT, relative)
}

/// Normalise a document path: trim, strip leading `/`, reject traversal.
pub fn normalize_file_path(raw: &str) -> GatewayResult<String> {
    let path = clean(raw)?;
    if path.is_empty() || path.ends_with('/') {
        return Err(GatewayError::invalid(format!(
            "path must name a document, got '{}'",
            raw
        )));
    }
    Ok(path)
}

/// Normalise a directory path to `""` (root) or `"a/b/"`.
pub fn normalize_dir_path(raw: Option<&str>) -> GatewayResult<String> {
    let path = clean(raw.unwrap_or(""))?;
    if path.is_empty() || path.ends_with('/') {
        Ok(path)
    } else {
        Ok(format!("{}/", path))
    }
}

fn clean(raw: &str) -> GatewayResult<String> {
    let path = raw.trim().replace('\\', "/");
    let path = path.trim_start_matches('/');
    if path
        .split('/')
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(GatewayError::invalid(format!(
            "path must not contain '.' or '..' segments: '{}'",
            raw
        )));
    }
    if path.contains("//") {
        return Err(GatewayError::invalid(format!(
            "path must not contain empty segments: '{}'",
            raw
        )));
    }
    Ok(path.to_string())
}
