//! Response persistence.
//!
//! Each entry is two files: the raw body at the key path and a JSON sidecar
//! holding `{status, headers}`. Reads treat every failure as a miss.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::cache::key::{cache_key, SIDECAR_SUFFIX};
use crate::observability::metrics;

/// Error type for cache writes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache metadata encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A header value as stored in the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedHeader {
    Single(String),
    Multi(Vec<String>),
}

/// A stored origin response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Bytes,
    pub headers: BTreeMap<String, CachedHeader>,
    pub status: u16,
}

#[derive(Serialize, Deserialize)]
struct Sidecar {
    status: u16,
    headers: BTreeMap<String, CachedHeader>,
}

impl CacheEntry {
    /// Capture a response for storage. Non UTF-8 header values are skipped.
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let mut stored: BTreeMap<String, CachedHeader> = BTreeMap::new();
        for name in headers.keys() {
            let values: Vec<String> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok().map(str::to_string))
                .collect();
            let header = match values.len() {
                0 => continue,
                1 => CachedHeader::Single(values.into_iter().next().unwrap_or_default()),
                _ => CachedHeader::Multi(values),
            };
            stored.insert(name.as_str().to_string(), header);
        }
        Self {
            body,
            headers: stored,
            status: status.as_u16(),
        }
    }

    /// Status code, falling back to 200 for out-of-range values.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    /// Rebuild an HTTP header map from the stored headers.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, header) in &self.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            let values: Vec<&str> = match header {
                CachedHeader::Single(v) => vec![v.as_str()],
                CachedHeader::Multi(vs) => vs.iter().map(String::as_str).collect(),
            };
            for v in values {
                if let Ok(v) = HeaderValue::from_str(v) {
                    map.append(name.clone(), v);
                }
            }
        }
        map
    }
}

/// On-disk response cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    /// Create a cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute body path for a URL path and query.
    pub fn entry_path(&self, path: &str, query: Option<&str>) -> PathBuf {
        self.root.join(cache_key(path, query))
    }

    /// Look up an entry. Missing or corrupt entries are misses.
    pub async fn get(&self, path: &str, query: Option<&str>) -> Option<CacheEntry> {
        let body_path = self.entry_path(path, query);
        let sidecar_path = sidecar_path(&body_path);

        let sidecar = match fs::read(&sidecar_path).await {
            Ok(raw) => raw,
            Err(_) => {
                metrics::record_cache_event("miss");
                return None;
            }
        };
        let sidecar: Sidecar = match serde_json::from_slice(&sidecar) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(path = ?sidecar_path, error = %e, "Ignoring corrupt cache metadata");
                metrics::record_cache_event("miss");
                return None;
            }
        };
        let body = match fs::read(&body_path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(path = ?body_path, error = %e, "Cache body unreadable");
                metrics::record_cache_event("miss");
                return None;
            }
        };

        metrics::record_cache_event("hit");
        Some(CacheEntry {
            body: Bytes::from(body),
            headers: sidecar.headers,
            status: sidecar.status,
        })
    }

    /// Store an entry, replacing any previous one.
    pub async fn put(
        &self,
        path: &str,
        query: Option<&str>,
        entry: &CacheEntry,
    ) -> Result<PathBuf, CacheError> {
        let body_path = self.entry_path(path, query);
        if let Some(parent) = body_path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let sidecar = serde_json::to_vec(&Sidecar {
            status: entry.status,
            headers: entry.headers.clone(),
        })?;

        fs::write(&body_path, &entry.body)
            .await
            .map_err(|source| CacheError::Io {
                path: body_path.clone(),
                source,
            })?;
        let sidecar_path = sidecar_path(&body_path);
        fs::write(&sidecar_path, sidecar)
            .await
            .map_err(|source| CacheError::Io {
                path: sidecar_path,
                source,
            })?;

        metrics::record_cache_event("write");
        Ok(body_path)
    }

    /// Store an entry, logging instead of failing.
    pub async fn put_best_effort(&self, path: &str, query: Option<&str>, entry: &CacheEntry) {
        match self.put(path, query, entry).await {
            Ok(file) => tracing::debug!(file = ?file, "Cached response"),
            Err(e) => {
                metrics::record_cache_event("write_error");
                tracing::error!(error = %e, path = %path, "Failed to write cache entry");
            }
        }
    }
}

fn sidecar_path(body_path: &Path) -> PathBuf {
    let mut name = body_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(SIDECAR_SUFFIX);
    body_path.with_file_name(name)
}
