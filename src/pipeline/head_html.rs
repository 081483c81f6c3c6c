//! Local `head.html` support.
//!
//! The origin injects its copy of `head.html` into every page. When the
//! project's local copy differs, the remote fragment inside the rendered
//! page is swapped for the local one, so head edits are visible before
//! they are pushed.
//!
//! Matching is a plain substring search restricted to the `<head>` region.
//! If anything does not line up the page is returned unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio::sync::Mutex;
use url::Url;

use crate::http::client::FetchContext;

#[derive(Debug, Default)]
struct HeadState {
    local_html: Option<String>,
    local_status: Option<StatusCode>,
    remote_html: Option<String>,
    remote_status: Option<StatusCode>,
}

impl HeadState {
    fn is_modified(&self) -> bool {
        match (&self.local_html, &self.remote_html) {
            (Some(local), Some(remote)) => {
                self.local_status == Some(StatusCode::OK)
                    && self.remote_status == Some(StatusCode::OK)
                    && local != remote
            }
            _ => false,
        }
    }
}

/// Lazily loaded local/remote head fragments.
pub struct HeadHtmlSupport {
    file_path: PathBuf,
    remote_url: Option<Url>,
    site_token: Option<String>,
    allow_insecure: bool,
    fetch: Arc<FetchContext>,
    state: Mutex<HeadState>,
}

impl HeadHtmlSupport {
    /// `origin` is the proxy origin; the remote fragment lives at `/head.html`.
    pub fn new(
        file_path: PathBuf,
        origin: Option<&Url>,
        site_token: Option<String>,
        allow_insecure: bool,
        fetch: Arc<FetchContext>,
    ) -> Self {
        Self {
            file_path,
            remote_url: origin.and_then(|o| o.join("/head.html").ok()),
            site_token,
            allow_insecure,
            fetch,
            state: Mutex::new(HeadState::default()),
        }
    }

    /// Local file backing this support.
    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    /// Load whatever has not been loaded yet.
    pub async fn update(&self) {
        let mut state = self.state.lock().await;
        if state.local_status.is_none() {
            self.load_local(&mut state).await;
        }
        if state.remote_status.is_none() {
            self.load_remote(&mut state).await;
        }
    }

    /// True when both fragments loaded and differ.
    pub async fn is_modified(&self) -> bool {
        self.update().await;
        self.state.lock().await.is_modified()
    }

    /// Forget the local copy; the next use re-reads it.
    pub async fn invalidate_local(&self) {
        let mut state = self.state.lock().await;
        state.local_html = None;
        state.local_status = None;
        tracing::debug!(path = ?self.file_path, "Local head.html invalidated");
    }

    /// Splice the local head into `html` if it differs from the remote one.
    pub async fn replace(&self, html: &str) -> String {
        self.update().await;
        let state = self.state.lock().await;
        if !state.is_modified() {
            return html.to_string();
        }
        match (&state.local_html, &state.remote_html) {
            (Some(local), Some(remote)) => splice_head(html, remote, local),
            _ => html.to_string(),
        }
    }

    async fn load_local(&self, state: &mut HeadState) {
        match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) => {
                state.local_html = Some(content.trim().to_string());
                state.local_status = Some(StatusCode::OK);
            }
            Err(e) => {
                tracing::debug!(path = ?self.file_path, error = %e, "No local head.html");
                state.local_html = None;
                state.local_status = Some(StatusCode::NOT_FOUND);
            }
        }
    }

    async fn load_remote(&self, state: &mut HeadState) {
        let Some(url) = &self.remote_url else {
            state.remote_status = Some(StatusCode::NOT_FOUND);
            return;
        };
        let client = match self.fetch.client(self.allow_insecure) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Unable to build fetch client for head.html");
                state.remote_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                return;
            }
        };
        let mut request = client.get(url.clone());
        if let Some(token) = &self.site_token {
            request = request.header("authorization", format!("token {}", token));
        }
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                state.remote_status = Some(status);
                if status == StatusCode::OK {
                    match response.text().await {
                        Ok(text) => state.remote_html = Some(text.trim().to_string()),
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "Failed to read remote head.html");
                            state.remote_status = Some(StatusCode::BAD_GATEWAY);
                        }
                    }
                } else {
                    tracing::debug!(url = %url, status = %status, "Remote head.html unavailable");
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to fetch remote head.html");
                state.remote_status = Some(StatusCode::BAD_GATEWAY);
            }
        }
    }
}

/// Replace the last `remote` occurrence inside `<head>…</head>` with `local`.
pub fn splice_head(html: &str, remote: &str, local: &str) -> String {
    if remote.is_empty() {
        return html.to_string();
    }
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let Some(open) = lower.find("<head>") else {
        return html.to_string();
    };
    let Some(close) = lower.rfind("</head>") else {
        return html.to_string();
    };
    let region_start = open + "<head>".len();
    if close < region_start {
        return html.to_string();
    }

    match html[region_start..close].rfind(remote) {
        Some(offset) => {
            let start = region_start + offset;
            let end = start + remote.len();
            let mut out = String::with_capacity(html.len() + local.len());
            out.push_str(&html[..start]);
            out.push_str(local);
            out.push_str(&html[end..]);
            out
        }
        None => html.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: &str = "<script src=\"/scripts/aem.js\"></script>";
    const LOCAL: &str = "<script src=\"/scripts/aem.js\"></script><link rel=\"stylesheet\" href=\"/x.css\">";

    #[test]
    fn splices_inside_head() {
        let page = format!("<html><HEAD><title>t</title>{}</HEAD><body></body></html>", REMOTE);
        let out = splice_head(&page, REMOTE, LOCAL);
        assert_eq!(
            out,
            format!("<html><HEAD><title>t</title>{}</HEAD><body></body></html>", LOCAL)
        );
    }

    #[test]
    fn replaces_last_occurrence_within_head() {
        let page = format!("<head>{r}<meta>{r}</head><body>{r}</body>", r = REMOTE);
        let out = splice_head(&page, REMOTE, "LOCAL");
        assert_eq!(out, format!("<head>{r}<meta>LOCAL</head><body>{r}</body>", r = REMOTE));
    }

    #[test]
    fn missing_boundaries_leave_page_unchanged() {
        let page = format!("<html><body>{}</body></html>", REMOTE);
        assert_eq!(splice_head(&page, REMOTE, LOCAL), page);
        let page = format!("<head>{}", REMOTE);
        assert_eq!(splice_head(&page, REMOTE, LOCAL), page);
    }

    #[test]
    fn content_outside_head_is_not_touched() {
        let page = format!("<head><title>x</title></head><body>{}</body>", REMOTE);
        assert_eq!(splice_head(&page, REMOTE, LOCAL), page);
    }

    #[test]
    fn second_application_is_a_noop() {
        let page = format!("<head>{}</head>", REMOTE);
        let once = splice_head(&page, REMOTE, "<meta name=\"local\">");
        let twice = splice_head(&once, REMOTE, "<meta name=\"local\">");
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn unmodified_support_returns_input() {
        let dir = tempfile::tempdir().unwrap();
        let support = HeadHtmlSupport::new(
            dir.path().join("head.html"),
            None,
            None,
            false,
            Arc::new(FetchContext::default()),
        );
        let page = format!("<head>{}</head>", REMOTE);
        assert!(!support.is_modified().await);
        assert_eq!(support.replace(&page).await, page);
    }

    #[tokio::test]
    async fn local_invalidation_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head.html");
        tokio::fs::write(&path, "  <meta one>\n").await.unwrap();
        let support = HeadHtmlSupport::new(path.clone(), None, None, false, Arc::new(FetchContext::default()));

        support.update().await;
        assert_eq!(support.state.lock().await.local_html.as_deref(), Some("<meta one>"));

        tokio::fs::write(&path, "<meta two>").await.unwrap();
        support.update().await;
        assert_eq!(support.state.lock().await.local_html.as_deref(), Some("<meta one>"));

        support.invalidate_local().await;
        support.update().await;
        assert_eq!(support.state.lock().await.local_html.as_deref(), Some("<meta two>"));
    }
}
