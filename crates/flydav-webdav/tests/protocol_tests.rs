//! Protocol surface tests.
//!
//! - OPTIONS advertises the supported verbs without authentication
//! - Unsupported verbs get 405 with `Allow`
//! - Mount prefix handling
//! - CORS headers and preflight
//! - Static UI mount

mod common;

use common::{TestServer, assert_file_content, assert_status};
use flydav_webdav::Config;
use flydav_webdav::ALLOWED_METHODS;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_options_without_credentials() {
    let server = TestServer::start().await;

    let resp = server.anonymous().options("/anything").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["allow"], ALLOWED_METHODS);
    assert_eq!(resp.headers()["dav"], "1");
}

#[tokio::test]
async fn test_unsupported_verbs() {
    let server = TestServer::start().await;
    let admin = server.admin();

    for verb in ["PROPFIND", "PROPPATCH", "LOCK", "POST", "PATCH"] {
        let resp = admin.request(verb, "/").send().await.unwrap();
        assert_eq!(
            resp.status(),
            StatusCode::METHOD_NOT_ALLOWED,
            "{verb} should be rejected"
        );
        assert_eq!(resp.headers()["allow"], ALLOWED_METHODS);
    }
}

#[tokio::test]
async fn test_mount_prefix_is_stripped() {
    let server = TestServer::with_prefix("/dav").await;
    let admin = server.admin();
    assert!(server.base_url().ends_with("/dav"));

    admin.put_ok("/notes.txt", b"n".to_vec()).await;
    assert!(server.storage_path("/notes.txt").exists());
    assert_file_content(&admin, "/notes.txt", b"n").await;
}

#[tokio::test]
async fn test_mount_prefix_links_and_destinations() {
    let server = TestServer::with_prefix("/dav").await;
    let admin = server.admin();
    admin.put_ok("/dir/a.txt", b"a".to_vec()).await;

    let html = admin.get_html("/dir").await.text().await.unwrap();
    assert!(html.contains("href=\"/dav/dir/a.txt\""), "{html}");

    // Destination URLs carry the prefix too
    let resp = admin.copy("/dir/a.txt", "/dir/b.txt", true).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_file_content(&admin, "/dir/b.txt", b"a").await;

    let json: Value = assert_status(admin.get("/dir").await, StatusCode::OK)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(json[2]["path"], "/dir/a.txt");
}

#[tokio::test]
async fn test_paths_outside_mount_not_found() {
    let server = TestServer::with_prefix("/dav").await;

    let (status, _) = server
        .raw_request("GET", "/elsewhere/a.txt", Some(("admin", common::harness::ADMIN_PASSWORD)))
        .await;
    assert_eq!(status, 404);
}

// ============================================================================
// CORS
// ============================================================================

const ORIGIN: &str = "https://app.example";

fn enable_cors(config: &mut Config) {
    config.cors.enabled = true;
    config.cors.allowed_origins = vec![ORIGIN.to_string()];
    config.cors.allow_credentials = true;
}

#[tokio::test]
async fn test_cors_preflight_without_credentials() {
    let server = TestServer::with_config("/", enable_cors).await;

    let resp = server
        .anonymous()
        .request("OPTIONS", "/docs/a.txt")
        .header("Origin", ORIGIN)
        .header("Access-Control-Request-Method", "PUT")
        .header("Access-Control-Request-Headers", "authorization, range")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let h = resp.headers();
    assert_eq!(h["access-control-allow-origin"], ORIGIN);
    assert_eq!(h["access-control-allow-credentials"], "true");
    assert!(h["access-control-allow-methods"].to_str().unwrap().contains("MOVE"));
    assert!(h["access-control-allow-headers"].to_str().unwrap().contains("Range"));
    assert_eq!(h["access-control-max-age"], "600");
}

#[tokio::test]
async fn test_cors_headers_on_actual_requests() {
    let server = TestServer::with_config("/", enable_cors).await;
    let admin = server.admin();
    admin.put_ok("/a.txt", b"hello".to_vec()).await;

    let resp = admin
        .request("GET", "/a.txt")
        .header("Origin", ORIGIN)
        .header("Range", "bytes=0-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-origin"], ORIGIN);
    assert!(
        resp.headers()["access-control-expose-headers"]
            .to_str()
            .unwrap()
            .contains("Content-Range")
    );

    // Unlisted origins get no grant
    let resp = admin
        .request("GET", "/a.txt")
        .header("Origin", "https://other.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_cors_disabled_by_default() {
    let server = TestServer::start().await;
    let resp = server
        .anonymous()
        .request("OPTIONS", "/")
        .header("Origin", ORIGIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

// ============================================================================
// Static UI
// ============================================================================

fn enable_ui(config: &mut Config) {
    config.ui.enabled = true;
    config.ui.path = "/app".to_string();
}

#[tokio::test]
async fn test_ui_assets_served_without_credentials() {
    let server = TestServer::with_config("/", enable_ui).await;
    std::fs::write(server.ui_path("index.html"), "<h1>flydav</h1>").unwrap();
    std::fs::create_dir_all(server.ui_path("js")).unwrap();
    std::fs::write(server.ui_path("js/main.js"), "start()").unwrap();

    let resp = server.client().get(server.url("/app/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert_eq!(resp.text().await.unwrap(), "<h1>flydav</h1>");

    let resp = server.client().get(server.url("/app/js/main.js")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "start()");

    let resp = server.client().get(server.url("/app/missing.css")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ui_does_not_open_webdav_paths() {
    let server = TestServer::with_config("/", enable_ui).await;
    server.admin().put_ok("/private.txt", b"p".to_vec()).await;

    let resp = server.client().get(server.url("/private.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Dot segments under the UI prefix stay inside the asset directory
    for target in ["/app/../private.txt", "/app/%2e%2e/private.txt"] {
        let (status, body) = server.raw_request("GET", target, None).await;
        assert_eq!(status, 404, "{target}");
        assert!(!body.ends_with("\r\n\r\np"), "{target} leaked data: {body}");
    }
}
