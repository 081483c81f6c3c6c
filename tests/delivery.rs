//! End-to-end delivery: local files, origin proxying, shaping and caching.

use std::sync::Arc;

use helix_dev_server::{ImportPersonality, PreviewPersonality};

mod common;

const SCRIPT_TAG: &str = "<script src=\"/__internal__/livereload.js\"></script>";

#[tokio::test]
async fn proxied_home_page_is_instrumented() {
    // 1. Origin and an empty project
    let (origin, hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let config = common::test_config(project.path(), Some(origin));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    // 2. GET /
    let response = common::client().get(format!("{}/", url)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    let body = response.text().await.unwrap();

    // 3. Shaped response
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["via"], "1.1 127.0.0.1");
    assert!(headers.get("x-frame-options").is_none());
    assert!(headers.get("content-security-policy").is_none());
    assert!(
        body.contains(&format!(
            "{}<meta property=\"hlx:proxyUrl\" content=\"http://{}/\"></head>",
            SCRIPT_TAG, origin
        )),
        "body: {}",
        body
    );
    assert!(hits.count() >= 1);

    server.stop().await;
}

#[tokio::test]
async fn headless_pages_still_get_script_and_proxy_url() {
    let (origin, _hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let config = common::test_config(project.path(), Some(origin));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client().get(format!("{}/bare.html", url)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.text().await.unwrap(),
        format!(
            "<html><body>hi{}<meta property=\"hlx:proxyUrl\" content=\"http://{}/bare.html\"></body></html>",
            SCRIPT_TAG, origin
        )
    );

    server.stop().await;
}

#[tokio::test]
async fn local_files_win_over_origin() {
    let (origin, hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("index.html"), "<html><head></head><body>local</body></html>").unwrap();
    std::fs::create_dir(project.path().join("styles")).unwrap();
    std::fs::write(project.path().join("styles/site.css"), "h1 { color: blue; }").unwrap();

    let config = common::test_config(project.path(), Some(origin));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;
    let client = common::client();

    let response = client.get(format!("{}/", url)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.text().await.unwrap(),
        "<html><head></head><body>local</body></html>"
    );

    let response = client.get(format!("{}/styles/site.css", url)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/css"));
    assert_eq!(response.text().await.unwrap(), "h1 { color: blue; }");

    assert_eq!(hits.count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn traversal_outside_project_is_forbidden() {
    let (origin, hits) = common::start_origin().await;
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("site");
    std::fs::create_dir(&project).unwrap();
    std::fs::write(root.path().join("secret.txt"), "top secret").unwrap();

    let config = common::test_config(&project, Some(origin));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client()
        .get(format!("{}/..%2fsecret.txt", url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(response.text().await.unwrap(), "");
    assert_eq!(hits.count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn cached_responses_skip_the_origin() {
    let (origin, hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = common::test_config(project.path(), Some(origin));
    config.cache.directory = Some(cache.path().to_path_buf());
    config.live_reload.enabled = false;
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;
    let client = common::client();

    let first = client.get(format!("{}/styles.css?v=1", url)).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.text().await.unwrap(), "body { color: red; }");
    assert_eq!(hits.count(), 1);
    assert!(cache.path().join("styles~v=1.css").is_file());
    assert!(cache.path().join("styles~v=1.css.meta.json").is_file());

    let second = client.get(format!("{}/styles.css?v=1", url)).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["content-type"], "text/css");
    assert_eq!(second.text().await.unwrap(), "body { color: red; }");
    assert_eq!(hits.count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn local_head_is_merged_into_proxied_pages() {
    let (origin, _hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let local_head = format!("{}<link rel=\"stylesheet\" href=\"/local.css\">", common::REMOTE_HEAD);
    std::fs::write(project.path().join("head.html"), &local_head).unwrap();

    let mut config = common::test_config(project.path(), Some(origin));
    config.live_reload.enabled = false;
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let body = common::client()
        .get(format!("{}/", url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(&format!("{}<meta property=\"hlx:proxyUrl\"", local_head)), "body: {}", body);
    assert!(!body.contains(SCRIPT_TAG));

    server.stop().await;
}

#[tokio::test]
async fn auth_failures_are_shaped() {
    let (origin, _hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let mut config = common::test_config(project.path(), Some(origin));
    config.proxy.auto_login_path = Some("/login".to_string());
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;
    let client = common::client();

    // Navigation to a protected page goes to the login path.
    let response = client
        .get(format!("{}/secret.html", url))
        .header("sec-fetch-dest", "document")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);
    assert_eq!(response.headers()["location"], "/login");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["via"], "1.1 127.0.0.1");

    // Sub-resource fetch keeps the 401 and gets the meta tag.
    let response = client
        .get(format!("{}/secret.html", url))
        .header("sec-fetch-dest", "empty")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert!(response.text().await.unwrap().contains("hlx:proxyUrl"));

    // Non-HTML 403 becomes an HTML page.
    let response = client.get(format!("{}/private.json", url)).send().await.unwrap();
    assert_eq!(response.status(), 403);
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
    let body = response.text().await.unwrap();
    assert!(body.contains("403 Forbidden"));
    assert!(body.contains(&format!("http://{}/private.json", origin)));

    server.stop().await;
}

#[tokio::test]
async fn remote_404_uses_local_not_found_page() {
    let (origin, _hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    std::fs::write(
        project.path().join("404.html"),
        "<html><head></head><body>custom 404</body></html>",
    )
    .unwrap();
    let config = common::test_config(project.path(), Some(origin));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client().get(format!("{}/nope", url)).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["via"], "1.1 127.0.0.1");
    let body = response.text().await.unwrap();
    assert!(body.contains("custom 404"));
    assert!(body.contains(SCRIPT_TAG));

    server.stop().await;
}

#[tokio::test]
async fn upstream_headers_are_filtered() {
    let (origin, _hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let mut config = common::test_config(project.path(), Some(origin));
    config.proxy.site_token = Some("s3cr3t".to_string());
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client()
        .get(format!("{}/echo.json", url))
        .header("cookie", "hlx-auth-token=abc; tracking=1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let echoed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(echoed["cookie"], "hlx-auth-token=abc");
    assert_eq!(echoed["authorization"], "token s3cr3t");
    assert_eq!(echoed["x-request-id"].as_str().unwrap().len(), 32);

    server.stop().await;
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let dead = common::free_port().await;
    let project = tempfile::tempdir().unwrap();
    let mut config = common::test_config(project.path(), None);
    config.proxy.origin = Some(format!("http://127.0.0.1:{}", dead));
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client().get(format!("{}/page", url)).send().await.unwrap();
    assert_eq!(response.status(), 502);

    server.stop().await;
}

#[tokio::test]
async fn missing_origin_answers_not_found() {
    let project = tempfile::tempdir().unwrap();
    let config = common::test_config(project.path(), None);
    let (server, url) = common::start_server(config, Arc::new(PreviewPersonality::new())).await;

    let response = common::client().get(format!("{}/page", url)).send().await.unwrap();
    assert_eq!(response.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn import_origin_follows_host_param_and_cookie() {
    let (origin, hits) = common::start_origin().await;
    let project = tempfile::tempdir().unwrap();
    let config = common::test_config(project.path(), None);
    let (server, url) = common::start_server(config, Arc::new(ImportPersonality::new())).await;
    let client = common::client();
    assert!(server.live_reload().is_none());

    // 1. No host anywhere
    let response = client.get(format!("{}/styles.css", url)).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(hits.count(), 0);

    // 2. Host from the query, remembered in a cookie
    let host = format!("http://{}", origin);
    let response = client
        .get(format!("{}/", url))
        .query(&[("host", host.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("hlx-proxyhost="));
    let body = response.text().await.unwrap();
    assert!(body.contains("<h1>Remote</h1>"));
    assert!(!body.contains(SCRIPT_TAG));

    // 3. Host from the cookie
    let pair = cookie.split(';').next().unwrap().to_string();
    let response = client
        .get(format!("{}/styles.css", url))
        .header("cookie", pair)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "body { color: red; }");

    // 4. Garbage host
    let response = client
        .get(format!("{}/", url))
        .query(&[("host", "not a url")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    server.stop().await;
}
