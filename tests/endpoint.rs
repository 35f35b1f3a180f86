//! Endpoint integration tests: a real Unix socket between server and
//! client, with a stub dispatcher standing in for the manager.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use netconnect::ipc::{Dispatch, IpcError, IpcServer, NetconnectClient};

struct StubManager;

#[async_trait]
impl Dispatch for StubManager {
    async fn dispatch(&self, func: &str, params: &[Value]) -> Result<Value, String> {
        match func {
            "echo" => match params {
                [a, b] => Ok(json!([a, b])),
                _ => Err("echo expects two parameters".to_string()),
            },
            "online_check" => Ok(json!({})),
            _ => Err(format!("Function {func} is not implemented.")),
        }
    }
}

fn start_endpoint() -> (TempDir, NetconnectClient) {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("netconnect-interface.sock");

    let server = IpcServer::bind(&socket).unwrap();
    tokio::spawn(server.serve(Arc::new(StubManager)));

    (dir, NetconnectClient::new(&socket))
}

#[tokio::test]
async fn echo_roundtrip_within_deadline() {
    let (_dir, client) = start_endpoint();
    client.wait_for_ready().await;

    let reply = tokio::time::timeout(
        Duration::from_millis(200),
        client.echo(json!("a"), json!("b")),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(reply, json!(["a", "b"]));
}

#[tokio::test]
async fn unknown_func_surfaces_remote_error() {
    let (_dir, client) = start_endpoint();
    client.wait_for_ready().await;

    let error = client.status().await.unwrap_err();

    match error {
        IpcError::Remote(message) => {
            assert_eq!(
                message,
                "netconnect-interface Function status is not implemented."
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn endpoint_keeps_serving_after_an_error_reply() {
    let (_dir, client) = start_endpoint();
    client.wait_for_ready().await;

    assert!(client.online_check().await.is_ok());

    let error = client.status().await.unwrap_err();
    assert!(matches!(error, IpcError::Remote(_)));

    let reply = client.echo(json!(1), json!(2)).await.unwrap();
    assert_eq!(reply, json!([1, 2]));
}

#[tokio::test]
async fn missing_daemon_times_out_or_errors_quickly() {
    let dir = TempDir::new().unwrap();
    let client = NetconnectClient::new(&dir.path().join("nobody-home.sock"));

    let started = std::time::Instant::now();
    let result = client.echo(json!("a"), json!("b")).await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(6));
}
