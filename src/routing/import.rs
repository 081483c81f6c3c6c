//! Import personality: a proxy whose origin each browser picks.
//!
//! `?host=https://example.com` selects the origin and is remembered in the
//! `hlx-proxyhost` cookie, so later requests (scripts, images) issued by
//! the proxied page reach the same host. Without either, the configured
//! origin is used. Live reload and head merging are off.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use url::Url;

use crate::config::DevServerConfig;
use crate::http::server::AppState;
use crate::pipeline::DeliveryOptions;
use crate::routing::Personality;
use crate::security::headers::find_cookie;

/// Query parameter selecting the origin.
pub const HOST_PARAM: &str = "host";

/// Cookie remembering the selected origin.
pub const HOST_COOKIE: &str = "hlx-proxyhost";

#[derive(Debug, Default)]
pub struct ImportPersonality;

impl ImportPersonality {
    pub fn new() -> Self {
        Self
    }
}

impl Personality for ImportPersonality {
    fn name(&self) -> &'static str {
        "import"
    }

    fn configure(&self, config: &mut DevServerConfig) {
        config.live_reload.enabled = false;
        config.proxy.head_merge = false;
    }

    fn install_routes(&self, router: Router<AppState>) -> Router<AppState> {
        router
            .route("/{*path}", any(import_handler))
            .route("/", any(import_handler))
    }
}

async fn import_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let query_host = parts.uri.query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == HOST_PARAM)
            .map(|(_, v)| v.into_owned())
    });
    let cookie_host = find_cookie(&parts.headers, HOST_COOKIE).map(|v| {
        urlencoding::decode(v)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| v.to_string())
    });

    let origin = match query_host.clone().or(cookie_host) {
        Some(host) => match Url::parse(&host) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            _ => {
                tracing::warn!(host = %host, "Rejecting invalid import host");
                return (StatusCode::BAD_REQUEST, "Invalid host").into_response();
            }
        },
        None => state.pipeline.origin().cloned(),
    };

    if query_host.is_some() {
        parts.uri = without_param(&parts.uri, HOST_PARAM);
    }

    let options = DeliveryOptions {
        origin,
        live_reload: false,
        head_merge: false,
    };
    let mut response = state
        .pipeline
        .deliver(Request::from_parts(parts, body), &options)
        .await;

    if let Some(host) = query_host {
        let cookie = format!("{}={}; Path=/", HOST_COOKIE, urlencoding::encode(&host));
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// `uri` with every `name=…` pair removed from its query.
fn without_param(uri: &Uri, name: &str) -> Uri {
    let Some(query) = uri.query() else {
        return uri.clone();
    };
    let mut kept = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if !key.is_empty() && key != name {
            kept.append_pair(&key, &value);
        }
    }
    let kept = kept.finish();
    let rebuilt = if kept.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), kept)
    };
    rebuilt.parse().unwrap_or_else(|_| uri.clone())
}
