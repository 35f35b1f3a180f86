//! Endpoint server.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::{Reply, Request};

/// Seam between the endpoint and the operations it exposes.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Execute a named operation; `Err` becomes an error reply.
    async fn dispatch(&self, func: &str, params: &[Value]) -> Result<Value, String>;
}

/// Request/reply server on a Unix socket.
pub struct IpcServer {
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the endpoint socket, replacing any stale socket file.
    ///
    /// # Errors
    /// Returns an IO error when the socket cannot be bound.
    pub fn bind(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(Self {
            listener: UnixListener::bind(path)?,
        })
    }

    /// Serve requests forever, one connection at a time.
    ///
    /// # Errors
    /// Returns an IO error when accepting fails fatally.
    pub async fn serve(self, dispatcher: Arc<dyn Dispatch>) -> std::io::Result<()> {
        loop {
            let (stream, _addr) = self.listener.accept().await?;
            if let Err(e) = handle_connection(stream, dispatcher.as_ref()).await {
                warn!("Endpoint connection failed: {e}");
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, dispatcher: &dyn Dispatch) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_request(dispatcher, &line).await;
        let mut wire = serde_json::to_string(&reply)?;
        wire.push('\n');
        writer.write_all(wire.as_bytes()).await?;
    }
    Ok(())
}

async fn handle_request(dispatcher: &dyn Dispatch, line: &str) -> Reply {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Reply::error(format!("Invalid request: {e}")),
    };

    debug!("Dispatching {} from {}", request.func, request.src_mid);
    match dispatcher.dispatch(&request.func, &request.params).await {
        Ok(message) => Reply::success(message),
        Err(message) => Reply::error(message),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::super::ReplyStatus;
    use super::*;

    struct EchoOnly;

    #[async_trait]
    impl Dispatch for EchoOnly {
        async fn dispatch(&self, func: &str, params: &[Value]) -> Result<Value, String> {
            match func {
                "echo" => Ok(json!(params)),
                _ => Err(format!("Function {func} is not implemented.")),
            }
        }
    }

    #[tokio::test]
    async fn unknown_func_reply_text() {
        let reply = handle_request(&EchoOnly, r#"{"func": "bogus", "params": []}"#).await;

        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.message, "Function bogus is not implemented.");
    }

    #[tokio::test]
    async fn invalid_json_is_an_error_reply() {
        let reply = handle_request(&EchoOnly, "{not json").await;

        assert_eq!(reply.status, ReplyStatus::Error);
        assert!(
            reply
                .message
                .as_str()
                .unwrap()
                .starts_with("Invalid request:")
        );
    }

    #[tokio::test]
    async fn echo_dispatches() {
        let reply =
            handle_request(&EchoOnly, r#"{"func": "echo", "params": ["a", "b"]}"#).await;

        assert_eq!(reply.status, ReplyStatus::Success);
        assert_eq!(reply.message, json!(["a", "b"]));
        assert_eq!(reply.mod_name, "netconnect-interface");
    }
}
