//! Header manipulation between browser, dev server and origin.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before forwarding upstream
//! - Reduce cookies to the auth cookie allow-list
//! - Strip headers that no longer describe the re-encoded body
//! - Remove framing and CSP restrictions so injected scripts run
//! - Force CORS and add a `via` header

use axum::http::header::{self, HeaderMap, HeaderValue};

/// Request headers never forwarded to the origin.
const HOP_BY_HOP_REQUEST: [&str; 4] = ["connection", "host", "proxy-connection", "accept-encoding"];

/// Response headers removed before answering the browser.
const STRIPPED_RESPONSE: [&str; 6] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "x-frame-options",
    "content-security-policy",
];

/// Options controlling which request headers reach the origin.
#[derive(Debug, Clone)]
pub struct ForwardPolicy<'a> {
    /// Forward every cookie instead of the allow-listed one.
    pub forward_cookies: bool,
    /// Cookie kept when `forward_cookies` is off.
    pub auth_cookie: &'a str,
    /// Sent as `authorization: token <value>` when present.
    pub site_token: Option<&'a str>,
}

/// Build the header set sent to the origin.
pub fn upstream_request_headers(incoming: &HeaderMap, policy: &ForwardPolicy<'_>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming.iter() {
        if HOP_BY_HOP_REQUEST.contains(&name.as_str()) || *name == header::COOKIE {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if policy.forward_cookies {
        for value in incoming.get_all(header::COOKIE) {
            headers.append(header::COOKIE, value.clone());
        }
    } else if let Some(value) = find_cookie(incoming, policy.auth_cookie) {
        if let Ok(v) = HeaderValue::from_str(&format!("{}={}", policy.auth_cookie, value)) {
            headers.insert(header::COOKIE, v);
        }
    }

    if let Some(token) = policy.site_token {
        if let Ok(v) = HeaderValue::from_str(&format!("token {}", token)) {
            headers.insert(header::AUTHORIZATION, v);
        }
    }

    headers
}

/// Look up a cookie value across all `cookie` headers.
pub fn find_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Make origin response headers safe to relay for a rewritten body.
pub fn sanitize_response_headers(headers: &mut HeaderMap, upstream_host: &str) {
    for name in STRIPPED_RESPONSE {
        headers.remove(name);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Ok(v) = HeaderValue::from_str(&format!("1.1 {}", upstream_host)) {
        headers.insert(header::VIA, v);
    }
}

/// True when the `content-type` header denotes HTML.
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}
