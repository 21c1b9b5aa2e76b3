//! Custom assertions for flydav integration tests.

use crate::common::Session;
use reqwest::{Response, StatusCode};
use serde_json::Value;

/// Assert a response status, showing the body on mismatch.
pub async fn assert_status(resp: Response, expected: StatusCode) -> Response {
    let status = resp.status();
    if status != expected {
        let body = resp.text().await.unwrap_or_default();
        panic!("Expected {expected}, got {status}: {body}");
    }
    resp
}

/// Assert that a file contains the expected content.
pub async fn assert_file_content(session: &Session, path: &str, expected: &[u8]) {
    let actual = session.get_bytes(path).await;
    assert_eq!(
        actual,
        expected,
        "Content mismatch for {}. Expected {} bytes, got {} bytes",
        path,
        expected.len(),
        actual.len()
    );
}

/// Assert that a path does not exist.
pub async fn assert_not_found(session: &Session, path: &str) {
    let resp = session.get(path).await;
    assert_eq!(
        resp.status(),
        StatusCode::NOT_FOUND,
        "Expected {path} to not exist"
    );
}

/// Names in a JSON directory listing, in server order.
pub async fn listing_names(session: &Session, path: &str) -> Vec<String> {
    let resp = assert_status(session.get(path).await, StatusCode::OK).await;
    let json: Value = resp.json().await.expect("listing is JSON");
    json.as_array()
        .expect("listing is an array")
        .iter()
        .map(|e| e["name"].as_str().expect("name").to_string())
        .collect()
}
