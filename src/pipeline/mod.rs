//! Delivery pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → RequestContext (http/request.rs)
//!     → local.rs: file under the project directory?  → serve it
//!     → cache: stored origin response?               → serve it verbatim
//!     → proxy.rs: fetch from the origin
//!         → shape (head merge, live-reload script, proxy meta, auth pages)
//!         → content indexer, cache write
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Local files always win over the origin
//! - Live-reload file tracking spans the whole request: every file read
//!   while the request is tracked is mapped to the page, and the bucket is
//!   closed even when the request future is dropped
//! - Request-level failures become responses (403, 404, 502); the pipeline
//!   never returns an error

pub mod head_html;
mod local;
mod proxy;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::cache::{CacheEntry, ResponseCache};
use crate::config::{DevServerConfig, ProxyConfig};
use crate::http::client::FetchContext;
use crate::http::request::RequestContext;
use crate::livereload::LiveReload;
use crate::observability::metrics;

pub use head_html::HeadHtmlSupport;

/// Page handed to a [`ContentIndexer`] after a successful HTML delivery.
#[derive(Debug)]
pub struct IndexedPage<'a> {
    pub body: &'a str,
    pub headers: &'a HeaderMap,
}

/// Consumer of delivered HTML pages (e.g. a local query index).
pub trait ContentIndexer: Send + Sync {
    fn index(
        &self,
        url: &str,
        page: &IndexedPage<'_>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Per-personality delivery switches.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Origin to proxy to. Without one, misses are answered with 404.
    pub origin: Option<Url>,
    /// Inject the live-reload script and track served files.
    pub live_reload: bool,
    /// Splice the local `head.html` into proxied pages.
    pub head_merge: bool,
}

/// Shared services used to answer a request.
pub struct Pipeline {
    project_dir: PathBuf,
    not_found_page: Option<PathBuf>,
    origin: Option<Url>,
    proxy: ProxyConfig,
    max_body_size: usize,
    fetch: Arc<FetchContext>,
    cache: Option<ResponseCache>,
    live_reload: Option<Arc<LiveReload>>,
    head_html: Option<Arc<HeadHtmlSupport>>,
    indexer: Option<Arc<dyn ContentIndexer>>,
}

impl Pipeline {
    /// Assemble the pipeline for a validated configuration.
    pub fn new(config: &DevServerConfig, fetch: Arc<FetchContext>) -> Self {
        let project_dir = std::fs::canonicalize(&config.project.directory)
            .unwrap_or_else(|_| config.project.directory.clone());
        let origin = config
            .proxy
            .origin
            .as_deref()
            .and_then(|o| Url::parse(o).ok());

        let live_reload = config
            .live_reload
            .enabled
            .then(|| LiveReload::new(Duration::from_millis(config.live_reload.debounce_ms)));

        let head_html = config.proxy.head_merge.then(|| {
            Arc::new(HeadHtmlSupport::new(
                project_dir.join(&config.project.head_html),
                origin.as_ref(),
                config.proxy.site_token.clone(),
                config.proxy.allow_insecure,
                fetch.clone(),
            ))
        });

        Self {
            not_found_page: config
                .project
                .not_found_page
                .as_ref()
                .map(|page| project_dir.join(page)),
            project_dir,
            origin,
            proxy: config.proxy.clone(),
            max_body_size: config.proxy.max_body_size,
            fetch,
            cache: config.cache.directory.as_ref().map(ResponseCache::new),
            live_reload,
            head_html,
            indexer: None,
        }
    }

    /// Attach a content indexer.
    pub fn with_indexer(mut self, indexer: Arc<dyn ContentIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Configured origin.
    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub fn fetch(&self) -> &Arc<FetchContext> {
        &self.fetch
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn live_reload(&self) -> Option<&Arc<LiveReload>> {
        self.live_reload.as_ref()
    }

    pub fn head_html(&self) -> Option<&Arc<HeadHtmlSupport>> {
        self.head_html.as_ref()
    }

    /// Answer one request.
    pub async fn deliver(&self, request: Request<Body>, options: &DeliveryOptions) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();

        let body = if parts.method == Method::GET || parts.method == Method::HEAD {
            None
        } else {
            match axum::body::to_bytes(body, self.max_body_size).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read request body");
                    metrics::record_request("error", StatusCode::PAYLOAD_TOO_LARGE.as_u16(), start);
                    return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
                }
            }
        };

        let ctx = RequestContext::new(parts.method, &parts.uri, parts.headers, body);
        tracing::debug!(
            id = ctx.id(),
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            "Delivering request"
        );

        let tracker = self.live_reload.as_ref().filter(|_| options.live_reload);
        let tracked = tracker.map(|live_reload| live_reload.track_request(ctx.request_id(), ctx.path()));

        let (source, response) = self.deliver_context(&ctx, options, tracker).await;
        drop(tracked);

        tracing::debug!(
            request_id = %ctx.request_id(),
            source,
            status = response.status().as_u16(),
            "Request delivered"
        );
        metrics::record_request(source, response.status().as_u16(), start);
        response
    }

    async fn deliver_context(
        &self,
        ctx: &RequestContext,
        options: &DeliveryOptions,
        tracker: Option<&Arc<LiveReload>>,
    ) -> (&'static str, Response) {
        match local::serve_local(&self.project_dir, ctx, tracker).await {
            local::LocalOutcome::Served(response) => return ("local", response),
            local::LocalOutcome::Forbidden => return ("local", StatusCode::FORBIDDEN.into_response()),
            local::LocalOutcome::Missing => {}
        }

        let (raw_path, query) = split_url(ctx.url());
        if ctx.is_cacheable_method() {
            if let Some(cache) = &self.cache {
                if let Some(entry) = cache.get(raw_path, query).await {
                    tracing::debug!(request_id = %ctx.request_id(), path = %raw_path, "Cache hit");
                    return ("cache", cached_response(entry));
                }
            }
        }

        let Some(origin) = &options.origin else {
            return ("none", (StatusCode::NOT_FOUND, "Not Found").into_response());
        };
        ("proxy", proxy::forward(self, ctx, origin, options, tracker).await)
    }
}

/// Split a raw `path?query` into its parts. An empty query counts as none.
pub(crate) fn split_url(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) if !query.is_empty() => (path, Some(query)),
        Some((path, _)) => (path, None),
        None => (url, None),
    }
}

fn cached_response(entry: CacheEntry) -> Response {
    let status = entry.status_code();
    let headers = entry.header_map();
    let mut response = Response::new(Body::from(entry.body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
