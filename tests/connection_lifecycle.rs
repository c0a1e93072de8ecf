//! Integration tests for connection lifecycle.
//!
//! Tests connecting, naming, disconnecting, and server shutdown.

mod common;

use common::{TestClient, TestServer};
use std::time::Duration;
use telchat::network::protocol;
use tokio::io::AsyncWriteExt;

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_basic_registration() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");

    let mut client = TestClient::connect(server.address(), "ankur")
        .await
        .expect("Failed to connect");
    client.register().await.expect("Registration failed");

    let registry = server.server().registry();
    assert!(registry.is_registered("ankur"));
    assert_eq!(registry.room_members("default"), vec!["ankur".to_string()]);

    client.send("/info").await.unwrap();
    client
        .expect(&protocol::info_line("ankur", "default"))
        .await
        .expect("Failed to receive info line");
}

#[tokio::test]
async fn test_disconnect_during_naming_leaves_no_trace() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let _present = server.connect("present").await.unwrap();

    let mut client = TestClient::connect(server.address(), "ghost").await.unwrap();
    client.expect(protocol::WELCOME).await.unwrap();
    client.send("").await.unwrap();
    client.expect(protocol::EMPTY_NAME).await.unwrap();
    drop(client);

    // Give the session time to notice the closed stream.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.server().registry().client_count(), 1);
    assert!(!server.server().registry().is_registered("ghost"));
}

#[tokio::test]
async fn test_disconnect_cleans_every_room() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut client = server.connect("erin").await.unwrap();
    client.change_room("lobby").await.unwrap();

    let registry = server.server().registry();
    assert!(registry.join_room("erin", "annex"));
    drop(client);

    wait_for("erin to be unregistered", || !registry.is_registered("erin")).await;
    assert!(registry.room_members("lobby").is_empty());
    assert!(registry.room_members("annex").is_empty());
    assert!(registry.room_members("default").is_empty());
}

#[tokio::test]
async fn test_name_can_be_reused_after_disconnect() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let first = server.connect("dave").await.unwrap();
    drop(first);

    let registry = server.server().registry();
    wait_for("dave to be released", || !registry.is_registered("dave")).await;
    let _second = server.connect("dave").await.expect("name should be free again");
}

#[tokio::test]
async fn test_invalid_utf8_only_ends_its_own_session() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut client = server.connect("mallory").await.unwrap();

    // Bypass the line helper to put raw bytes on the wire.
    let mut raw = tokio::net::TcpStream::connect(server.address()).await.unwrap();
    raw.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();
    drop(raw);

    client.send("still here").await.unwrap();
    client.send("/info").await.unwrap();
    client
        .expect(&protocol::info_line("mallory", "default"))
        .await
        .expect("unrelated session must survive");
}

#[tokio::test]
async fn test_shutdown_closes_clients_and_refuses_new_ones() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = server.connect("alice").await.unwrap();
    let mut naming = TestClient::connect(server.address(), "late").await.unwrap();
    naming.expect(protocol::WELCOME).await.unwrap();

    server.server().shutdown().await.expect("clean shutdown");

    alice.expect_closed().await.unwrap();
    naming.expect_closed().await.unwrap();
    assert!(server.server().is_shutting_down());
    assert!(tokio::net::TcpStream::connect(server.address()).await.is_err());

    // A second shutdown is a no-op.
    server.server().shutdown().await.expect("idempotent shutdown");
}

#[tokio::test]
async fn test_shutdown_flushes_journal() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = server.connect("alice").await.unwrap();
    let mut bob = server.connect("bob").await.unwrap();

    bob.send("last words").await.unwrap();
    alice.expect("last words").await.unwrap();

    server.server().shutdown().await.expect("clean shutdown");

    let on_disk = std::fs::read_to_string(server.journal_path()).unwrap();
    assert!(on_disk.ends_with(" bob@default: last words\n"), "journal was {on_disk:?}");
}
