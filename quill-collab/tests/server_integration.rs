//! End-to-end tests over real TCP connections.
//!
//! A server is started on a free port per test; clients run the same
//! handshake and line protocol as the interactive binary.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use quill_collab::{
    ClientError, CollabServer, Role, ServerConfig, ServerContext, SyncClient,
};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: String,
    ctx: Arc<ServerContext>,
    _dir: tempfile::TempDir,
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_test_server(roles: &str) -> TestServer {
    let port = free_port().await;
    let dir = tempfile::tempdir().unwrap();
    let roles_path = dir.path().join("roles.txt");
    std::fs::write(&roles_path, roles).unwrap();

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_interval: Duration::from_millis(25),
        roles_path,
        snapshot_path: dir.path().join("doc.md"),
        ..ServerConfig::default()
    };
    let server = CollabServer::new(config);
    let ctx = server.context();
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give the listener time to bind.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr: format!("127.0.0.1:{port}"),
        ctx,
        _dir: dir,
    }
}

async fn connect(server: &TestServer, user: &str) -> (SyncClient, quill_collab::Bootstrap) {
    timeout(WAIT, SyncClient::connect(&server.addr, user))
        .await
        .expect("handshake timed out")
        .expect("handshake failed")
}

async fn read_lines(client: &mut SyncClient, count: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        let line = timeout(WAIT, client.next_line())
            .await
            .expect("read timed out")
            .expect("read failed")
            .expect("connection closed");
        lines.push(line);
    }
    lines
}

#[tokio::test]
async fn bootstrap_carries_role_version_and_document() {
    let server = start_test_server("alice write\n").await;
    let (_client, bootstrap) = connect(&server, "alice").await;

    assert_eq!(bootstrap.role, Role::Write);
    assert_eq!(bootstrap.version, 0);
    assert!(bootstrap.document.is_empty());
}

#[tokio::test]
async fn unknown_users_are_rejected_at_handshake() {
    let server = start_test_server("alice write\n").await;
    let result = timeout(WAIT, SyncClient::connect(&server.addr, "mallory"))
        .await
        .unwrap();
    match result {
        Err(ClientError::Rejected(line)) => assert_eq!(line, "Reject UNAUTHORISED"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn accepted_edit_is_broadcast_to_every_session() {
    let server = start_test_server("alice write\nbob read\n").await;
    let (mut alice, _) = connect(&server, "alice").await;
    let (mut bob, _) = connect(&server, "bob").await;

    alice.send("INSERT 0 hi").await.unwrap();

    let expected = vec![
        "VERSION 1".to_string(),
        "EDIT alice INSERT 0 hi SUCCESS".to_string(),
        "END".to_string(),
    ];
    let seen_by_alice = read_lines(&mut alice, 3).await;
    let seen_by_bob = read_lines(&mut bob, 3).await;
    assert_eq!(seen_by_alice, expected);
    assert_eq!(seen_by_bob, seen_by_alice);
}

#[tokio::test]
async fn read_role_edits_are_rejected_in_the_delta() {
    let server = start_test_server("bob read\n").await;
    let (mut bob, _) = connect(&server, "bob").await;

    bob.send("INSERT 0 X").await.unwrap();
    let lines = read_lines(&mut bob, 3).await;
    assert_eq!(lines[1], "EDIT bob INSERT 0 X Reject UNAUTHORISED");

    // The document is untouched.
    bob.send("DOC?").await.unwrap();
    let response = read_lines(&mut bob, 2).await;
    assert_eq!(response, vec!["DOC?".to_string(), String::new()]);
}

#[tokio::test]
async fn perm_query_answers_inline() {
    let server = start_test_server("bob read\n").await;
    let (mut bob, _) = connect(&server, "bob").await;

    bob.send("PERM?").await.unwrap();
    let lines = read_lines(&mut bob, 2).await;
    assert_eq!(lines, vec!["PERM?".to_string(), "read".to_string()]);
}

#[tokio::test]
async fn log_query_returns_the_full_audit_trail() {
    let server = start_test_server("alice write\n").await;
    let (mut alice, _) = connect(&server, "alice").await;

    alice.send("INSERT 0 first").await.unwrap();
    let _delta = read_lines(&mut alice, 3).await;

    alice.send("LOG?").await.unwrap();
    let lines = read_lines(&mut alice, 4).await;
    assert_eq!(
        lines,
        vec![
            "LOG?".to_string(),
            "VERSION 1".to_string(),
            "EDIT alice INSERT 0 first SUCCESS".to_string(),
            "END".to_string(),
        ]
    );
}

#[tokio::test]
async fn late_joiner_bootstraps_from_the_committed_text() {
    let server = start_test_server("alice write\nbob read\n").await;
    let (mut alice, _) = connect(&server, "alice").await;

    alice.send("INSERT 0 shared state").await.unwrap();
    let _delta = read_lines(&mut alice, 3).await;

    let (_bob, bootstrap) = connect(&server, "bob").await;
    assert_eq!(bootstrap.version, 1);
    assert_eq!(bootstrap.document_text(), "shared state");
}

#[tokio::test]
async fn disconnect_releases_the_slot_and_writes_a_snapshot() {
    let server = start_test_server("alice write\n").await;
    let (mut alice, _) = connect(&server, "alice").await;

    alice.send("INSERT 0 persisted").await.unwrap();
    let _delta = read_lines(&mut alice, 3).await;
    alice.disconnect().await.unwrap();

    // Wait for the session task to release the slot and write doc.md.
    let snapshot_path = server.ctx.config.snapshot_path.clone();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if server.ctx.registry.active_count().await == 0 {
            if let Ok(contents) = std::fs::read_to_string(&snapshot_path) {
                if contents == "persisted" {
                    break;
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "snapshot not written in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn full_session_table_rejects_the_next_handshake() {
    let port = free_port().await;
    let dir = tempfile::tempdir().unwrap();
    let roles_path = dir.path().join("roles.txt");
    std::fs::write(&roles_path, "alice write\n").unwrap();

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_interval: Duration::from_millis(25),
        roles_path,
        snapshot_path: dir.path().join("doc.md"),
        max_sessions: 1,
        ..ServerConfig::default()
    };
    let server = CollabServer::new(config);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let addr = format!("127.0.0.1:{port}");
    let (_held, _) = timeout(WAIT, SyncClient::connect(&addr, "alice"))
        .await
        .unwrap()
        .unwrap();

    match timeout(WAIT, SyncClient::connect(&addr, "alice")).await.unwrap() {
        Err(ClientError::Rejected(line)) => assert_eq!(line, "Reject FULL"),
        other => panic!("expected full rejection, got {other:?}"),
    }
}
