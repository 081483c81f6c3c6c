//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use helix_dev_server::{DevServer, DevServerConfig, Personality};

pub const REMOTE_HEAD: &str = "<script src=\"/scripts/aem.js\" type=\"module\"></script>";

pub const HOME_PAGE: &str = "<html><head><title>Home</title><script src=\"/scripts/aem.js\" type=\"module\"></script></head><body><h1>Remote</h1></body></html>";

/// Requests seen by the mock origin.
#[derive(Clone, Default)]
pub struct OriginHits(Arc<AtomicUsize>);

impl OriginHits {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start an axum router on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Start a mock origin serving a small site.
///
/// - `/` and `/index.html`: HTML page
/// - `/head.html`: remote head fragment
/// - `/styles.css`: stylesheet
/// - `/secret.html`: 401 HTML, `/private.json`: 403 JSON
/// - `/echo.json`: request headers as JSON
/// - anything else: 404 HTML
pub async fn start_origin() -> (SocketAddr, OriginHits) {
    let hits = OriginHits::default();
    let router = Router::new()
        .route("/", get(home))
        .route("/index.html", get(home))
        .route("/head.html", get(head_fragment))
        .route("/bare.html", get(bare))
        .route("/styles.css", get(styles))
        .route("/secret.html", get(secret))
        .route("/private.json", get(private))
        .route("/echo.json", get(echo).post(echo))
        .fallback(not_found)
        .with_state(hits.clone());
    (serve(router).await, hits)
}

async fn home(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::X_FRAME_OPTIONS, "DENY"),
            (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
        ],
        HOME_PAGE,
    )
}

async fn bare(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    ([(header::CONTENT_TYPE, "text/html")], "<html><body>hi</body></html>")
}

async fn head_fragment(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    ([(header::CONTENT_TYPE, "text/html")], format!("{}\n", REMOTE_HEAD))
}

async fn styles(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    ([(header::CONTENT_TYPE, "text/css")], "body { color: red; }")
}

async fn secret(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "text/html")],
        "<html><head></head><body>login required</body></html>",
    )
}

async fn private(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "application/json")],
        "{\"error\":\"forbidden\"}",
    )
}

async fn echo(State(hits): State<OriginHits>, headers: HeaderMap) -> impl IntoResponse {
    hits.hit();
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                serde_json::Value::String(v.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    ([(header::CONTENT_TYPE, "application/json")], serde_json::Value::Object(map).to_string())
}

async fn not_found(State(hits): State<OriginHits>) -> impl IntoResponse {
    hits.hit();
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html")],
        "<html><head></head><body>remote 404</body></html>",
    )
}

/// Config for a server on an ephemeral port, without env proxies.
pub fn test_config(project: &Path, origin: Option<SocketAddr>) -> DevServerConfig {
    let mut config = DevServerConfig::default();
    config.project.directory = project.to_path_buf();
    config.listener.port = 0;
    config.proxy.origin = origin.map(|addr| format!("http://{}", addr));
    config.proxy.use_env_proxy = false;
    config.live_reload.debounce_ms = 50;
    config
}

/// Build and start a server.
pub async fn start_server(config: DevServerConfig, personality: Arc<dyn Personality>) -> (DevServer, String) {
    let server = DevServer::new(config, personality).unwrap();
    server.start().await.unwrap();
    let url = server.url().unwrap();
    (server, url)
}

/// HTTP client that never uses env proxies or follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
