//! Request normalization.
//!
//! # Responsibilities
//! - Assign a process-local sequence id and a random request id
//! - Normalize the path (`/` → `/index.html`, extensionless → `.html`)
//! - Split the final segment into resource path, selector and extension
//! - Keep query, headers, method and body for the pipeline
//!
//! # Design Decisions
//! - Parsing never fails; malformed segments are kept literally
//! - The context is immutable once built

use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Header carrying the request id to the origin.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Length of the random request id.
const REQUEST_ID_LEN: usize = 32;

/// Global counter for context ids. Relaxed ordering is enough for uniqueness.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Normalized, immutable view of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: u64,
    request_id: String,
    url: String,
    path: String,
    resource_path: String,
    selector: String,
    extension: String,
    query_string: String,
    params: Vec<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestContext {
    /// Build a context from the raw request parts.
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Option<Bytes>) -> Self {
        let raw_path = uri.path();
        let query_string = uri.query().unwrap_or_default().to_string();
        let url = match uri.query() {
            Some(q) => format!("{}?{}", raw_path, q),
            None => raw_path.to_string(),
        };

        let path = normalize_path(raw_path);
        let (resource_path, selector, extension) = split_path(&path);

        let params = url::form_urlencoded::parse(query_string.as_bytes())
            .into_owned()
            .collect();

        Self {
            id: CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            request_id: generate_request_id(),
            url,
            path,
            resource_path,
            selector,
            extension,
            query_string,
            params,
            method,
            headers,
            body,
        }
    }

    /// Process-local sequence number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Random 32 character token.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Raw path and query as received.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Selector without surrounding dots, empty when absent.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Query string without the leading `?`.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Decoded query parameters in request order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First value of a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// True for methods whose responses may be cached.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Collapse slashes and make the path point at a file.
pub fn normalize_path(raw: &str) -> String {
    let mut path = String::with_capacity(raw.len() + 10);
    if !raw.starts_with('/') {
        path.push('/');
    }
    let mut prev_slash = false;
    for c in raw.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        path.push(c);
    }

    if path.ends_with('/') {
        path.push_str("index.html");
    }

    let last_slash = path.rfind('/').unwrap_or(0);
    let has_extension = path.rfind('.').is_some_and(|dot| dot > last_slash);
    if !has_extension {
        path.push_str(".html");
    }
    path
}

/// Split a normalized path into `(resource_path, selector, extension)`.
fn split_path(path: &str) -> (String, String, String) {
    let last_slash = path.rfind('/').unwrap_or(0);
    let last_dot = match path.rfind('.') {
        Some(dot) if dot > last_slash => dot,
        _ => return (path.to_string(), String::new(), String::new()),
    };
    let extension = path[last_dot + 1..].to_string();
    let stem = &path[..last_dot];

    // Dots inside the base name separate the selector.
    match stem[last_slash + 1..].find('.') {
        Some(offset) => {
            let first_dot = last_slash + 1 + offset;
            (
                stem[..first_dot].to_string(),
                stem[first_dot + 1..].to_string(),
                extension,
            )
        }
        None => (stem.to_string(), String::new(), extension),
    }
}

fn generate_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect()
}
