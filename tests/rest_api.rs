//! Integration tests for the HTTP adapter.

mod common;

use common::TestServer;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_post_relays_to_room_and_journal() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = server.connect("alice").await.unwrap();
    let http = reqwest::Client::new();

    let response = http
        .post(server.http_url("/post"))
        .json(&json!({"name": "webuser", "room": "default", "msg": "hello from the web"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let line = alice.expect("hello from the web").await.unwrap();
    assert!(line.contains("webuser"));

    server.server().journal().flush().await.unwrap();
    let response = http.get(server.http_url("/messages")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"), "got {content_type:?}");
    let body = response.text().await.unwrap();
    assert!(body.contains(" webuser@default: hello from the web\n"), "got {body:?}");
}

#[tokio::test]
async fn test_messages_include_chat_after_flush() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = server.connect("alice").await.unwrap();
    let mut bob = server.connect("bob").await.unwrap();

    bob.send("hi message 1").await.unwrap();
    bob.send("hi message 2").await.unwrap();
    alice.expect("hi message 2").await.unwrap();

    // The session journals right after relaying; poll past the flush interval.
    let http = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let body = loop {
        let body = http
            .get(server.http_url("/messages"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        if body.contains("hi message 2") {
            break body;
        }
        assert!(tokio::time::Instant::now() < deadline, "journal never caught up: {body:?}");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    };

    let first = body.find("bob@default: hi message 1").expect("first message");
    let second = body.find("bob@default: hi message 2").expect("second message");
    assert!(first < second);
}

#[tokio::test]
async fn test_bad_post_bodies_are_rejected() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let http = reqwest::Client::new();

    let not_json = http
        .post(server.http_url("/post"))
        .body("name=alice")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
    assert_eq!(not_json.text().await.unwrap(), "bad request body");

    let empty_field = http
        .post(server.http_url("/post"))
        .json(&json!({"name": "alice", "room": "", "msg": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty_field.status(), StatusCode::BAD_REQUEST);

    let missing_field = http
        .post(server.http_url("/post"))
        .json(&json!({"name": "alice", "msg": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);

    server.server().journal().flush().await.unwrap();
    let snapshot = server.server().journal().snapshot().await.unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn test_wrong_methods_are_not_allowed() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let http = reqwest::Client::new();

    let response = http.post(server.http_url("/messages")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = http.get(server.http_url("/post")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
