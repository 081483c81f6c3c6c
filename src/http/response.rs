//! Response transformation helpers.
//!
//! # Responsibilities
//! - Inject the live-reload bootstrap script into HTML
//! - Record the true origin URL in a `hlx:proxyUrl` meta tag
//! - Synthesize an HTML page for non-HTML 401/403 responses
//! - Detect top-level navigations for auto-login redirects
//!
//! # Design Decisions
//! - Tag lookups are ASCII case-insensitive
//! - Injection never fails; pages without anchors get the fragment appended

use axum::http::{header, HeaderMap, StatusCode};

/// Insert `tag` before `</head>`, else before `</body>`, else at the end.
pub fn inject_script(html: &str, tag: &str) -> String {
    inject(html, tag)
}

/// Insert the proxy URL meta tag, placed like [`inject_script`].
pub fn inject_proxy_meta(html: &str, proxy_url: &str) -> String {
    inject(html, &proxy_meta_tag(proxy_url))
}

fn inject(html: &str, fragment: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let anchor = lower.find("</head>").or_else(|| lower.rfind("</body>"));
    match anchor {
        Some(pos) => insert_at(html, pos, fragment),
        None => format!("{}{}", html, fragment),
    }
}

pub fn proxy_meta_tag(proxy_url: &str) -> String {
    format!(
        "<meta property=\"hlx:proxyUrl\" content=\"{}\">",
        escape_html(proxy_url)
    )
}

/// Minimal page for auth failures on non-HTML resources, so browser tooling
/// still sees the proxy URL and can offer to log in.
pub fn auth_error_page(status: StatusCode, proxy_url: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title>{meta}</head>\
         <body><h1>{code} {reason}</h1><p>The origin refused access to <code>{url}</code>.</p></body></html>\n",
        code = status.as_u16(),
        reason = reason,
        meta = proxy_meta_tag(proxy_url),
        url = escape_html(proxy_url),
    )
}

/// True when the request looks like the browser loading a page.
pub fn is_navigation(headers: &HeaderMap) -> bool {
    if let Some(dest) = headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
        return dest.eq_ignore_ascii_case("document");
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn insert_at(html: &str, pos: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(html.len() + fragment.len());
    out.push_str(&html[..pos]);
    out.push_str(fragment);
    out.push_str(&html[pos..]);
    out
}
