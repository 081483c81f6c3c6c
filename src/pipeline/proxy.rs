//! Origin stage: forward, then shape the response for the browser.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::{local, split_url, DeliveryOptions, IndexedPage, Pipeline};
use crate::cache::CacheEntry;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::response::{auth_error_page, inject_proxy_meta, inject_script, is_navigation};
use crate::livereload::{script_tag, LiveReload};
use crate::security::headers::{
    is_html, sanitize_response_headers, upstream_request_headers, ForwardPolicy,
};

/// Fetch `ctx` from `origin` and turn the answer into a browser response.
pub(super) async fn forward(
    pipeline: &Pipeline,
    ctx: &RequestContext,
    origin: &Url,
    options: &DeliveryOptions,
    tracker: Option<&Arc<LiveReload>>,
) -> Response {
    let upstream = upstream_url(origin, ctx.url());

    let policy = ForwardPolicy {
        forward_cookies: pipeline.proxy.forward_cookies,
        auth_cookie: &pipeline.proxy.auth_cookie,
        site_token: pipeline.proxy.site_token.as_deref(),
    };
    let mut headers = upstream_request_headers(ctx.headers(), &policy);
    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
        headers.insert(X_REQUEST_ID, value);
    }

    let client = match pipeline.fetch.client(pipeline.proxy.allow_insecure) {
        Ok(client) => client,
        Err(e) => return bad_gateway(ctx, &upstream, &e),
    };
    let mut request = client
        .request(ctx.method().clone(), upstream.clone())
        .headers(headers);
    if let Some(body) = ctx.body() {
        request = request.body(body.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return bad_gateway(ctx, &upstream, &e),
    };

    let status = response.status();
    let mut headers = response.headers().clone();
    sanitize_response_headers(&mut headers, upstream.host_str().unwrap_or_default());
    let html = is_html(&headers);

    tracing::info!(
        request_id = %ctx.request_id(),
        upstream = %upstream,
        status = status.as_u16(),
        "Origin responded"
    );

    if status == StatusCode::NOT_FOUND && html {
        if let Some(mut page) = local::not_found_page(pipeline.not_found_page.as_ref(), ctx, tracker).await {
            relay_proxy_headers(&headers, &mut page);
            return page;
        }
    }

    let shaped = Shaping {
        pipeline,
        ctx,
        upstream: &upstream,
        options,
        tracker,
        status,
        headers,
    };
    match status {
        StatusCode::OK if html => shaped.html(response).await,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => shaped.auth_failure(response, html).await,
        _ => shaped.passthrough(response).await,
    }
}

/// Origin URL for a raw request path and query.
pub(super) fn upstream_url(origin: &Url, raw: &str) -> Url {
    let (path, query) = split_url(raw);
    let mut url = origin.clone();
    url.set_path(path);
    url.set_query(query);
    url
}

struct Shaping<'a> {
    pipeline: &'a Pipeline,
    ctx: &'a RequestContext,
    upstream: &'a Url,
    options: &'a DeliveryOptions,
    tracker: Option<&'a Arc<LiveReload>>,
    status: StatusCode,
    headers: HeaderMap,
}

impl Shaping<'_> {
    async fn html(self, response: reqwest::Response) -> Response {
        let mut body = match response.text().await {
            Ok(text) => text,
            Err(e) => return bad_gateway(self.ctx, self.upstream, &e),
        };

        if self.options.head_merge {
            if let Some(head) = &self.pipeline.head_html {
                body = head.replace(&body).await;
                // Watched even while missing, so creating it is noticed.
                if let Some(live_reload) = self.tracker {
                    live_reload.register_file(self.ctx.request_id(), head.file_path());
                }
            }
        }
        if self.tracker.is_some() {
            body = inject_script(&body, &script_tag());
        }
        body = inject_proxy_meta(&body, self.upstream.as_str());

        if let Some(indexer) = &self.pipeline.indexer {
            let page = IndexedPage {
                body: &body,
                headers: &self.headers,
            };
            if let Err(e) = indexer.index(self.upstream.as_str(), &page) {
                tracing::warn!(
                    request_id = %self.ctx.request_id(),
                    url = %self.upstream,
                    error = %e,
                    "Content indexer failed"
                );
            }
        }

        let body = Bytes::from(body);
        self.store(&body).await;
        build_response(self.status, self.headers, Body::from(body))
    }

    async fn auth_failure(self, response: reqwest::Response, html: bool) -> Response {
        if !html {
            let mut headers = self.headers;
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            let page = auth_error_page(self.status, self.upstream.as_str());
            return build_response(self.status, headers, Body::from(page));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return bad_gateway(self.ctx, self.upstream, &e),
        };

        if let Some(login) = &self.pipeline.proxy.auto_login_path {
            if is_navigation(self.ctx.headers()) && self.ctx.url() != login.as_str() {
                if let Ok(location) = HeaderValue::from_str(login) {
                    tracing::info!(
                        request_id = %self.ctx.request_id(),
                        location = %login,
                        "Redirecting navigation to login"
                    );
                    let mut redirect = StatusCode::FOUND.into_response();
                    redirect.headers_mut().insert(header::LOCATION, location);
                    relay_proxy_headers(&self.headers, &mut redirect);
                    return redirect;
                }
            }
        }

        let body = inject_proxy_meta(&text, self.upstream.as_str());
        build_response(self.status, self.headers, Body::from(body))
    }

    async fn passthrough(self, response: reqwest::Response) -> Response {
        let cacheable = self.pipeline.cache.is_some()
            && self.ctx.method() == Method::GET
            && self.status.is_success();
        if !cacheable {
            let body = Body::from_stream(response.bytes_stream());
            return build_response(self.status, self.headers, body);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return bad_gateway(self.ctx, self.upstream, &e),
        };
        self.store(&body).await;
        build_response(self.status, self.headers, Body::from(body))
    }

    /// Best-effort cache write for GET responses.
    async fn store(&self, body: &Bytes) {
        let Some(cache) = &self.pipeline.cache else {
            return;
        };
        if self.ctx.method() != Method::GET {
            return;
        }
        let (path, query) = split_url(self.ctx.url());
        let entry = CacheEntry::new(self.status, &self.headers, body.clone());
        cache.put_best_effort(path, query, &entry).await;
    }
}

/// Copy the CORS and `via` headers every proxied answer carries.
fn relay_proxy_headers(from: &HeaderMap, to: &mut Response) {
    for name in [header::ACCESS_CONTROL_ALLOW_ORIGIN, header::VIA] {
        if let Some(value) = from.get(&name) {
            to.headers_mut().insert(name, value.clone());
        }
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn bad_gateway(ctx: &RequestContext, upstream: &Url, error: &reqwest::Error) -> Response {
    tracing::error!(
        request_id = %ctx.request_id(),
        upstream = %upstream,
        error = %error,
        "Upstream request failed"
    );
    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
}
