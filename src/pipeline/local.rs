//! Local file stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::http::request::RequestContext;
use crate::http::response::inject_script;
use crate::livereload::{script_tag, LiveReload};
use crate::security::paths::{resolve_local_path, LocalPath};

pub(super) enum LocalOutcome {
    Served(Response),
    Forbidden,
    Missing,
}

/// Serve `ctx.path()` from the project directory if such a file exists.
pub(super) async fn serve_local(
    root: &Path,
    ctx: &RequestContext,
    tracker: Option<&Arc<LiveReload>>,
) -> LocalOutcome {
    let file = match resolve_local_path(root, ctx.path()) {
        LocalPath::Inside(file) => file,
        LocalPath::Forbidden(file) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                path = ?file,
                "Refusing path outside the project directory"
            );
            return LocalOutcome::Forbidden;
        }
    };

    match tokio::fs::metadata(&file).await {
        Ok(meta) if meta.is_file() => {}
        _ => return LocalOutcome::Missing,
    }

    if let Some(live_reload) = tracker {
        live_reload.register_file(ctx.request_id(), &file);
    }

    let mut response = send_file(file.clone(), ctx).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    tracing::debug!(request_id = %ctx.request_id(), file = ?file, "Served local file");
    LocalOutcome::Served(response)
}

/// The project's 404 page, if it exists.
pub(super) async fn not_found_page(
    page: Option<&PathBuf>,
    ctx: &RequestContext,
    tracker: Option<&Arc<LiveReload>>,
) -> Option<Response> {
    let page = page?;
    let html = tokio::fs::read_to_string(page).await.ok()?;
    let body = match tracker {
        Some(live_reload) => {
            live_reload.register_file(ctx.request_id(), page);
            inject_script(&html, &script_tag())
        }
        None => html,
    };
    Some(
        (
            StatusCode::NOT_FOUND,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response(),
    )
}

async fn send_file(file: PathBuf, ctx: &RequestContext) -> Response {
    // ServeFile only answers GET and HEAD; other methods read the file too.
    let mut request = Request::new(Body::empty());
    *request.method_mut() = if ctx.method() == Method::HEAD {
        Method::HEAD
    } else {
        Method::GET
    };
    *request.headers_mut() = ctx.headers().clone();

    match ServeFile::new(file).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
