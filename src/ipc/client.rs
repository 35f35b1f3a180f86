//! Endpoint client.
//!
//! One method per endpoint operation, each bounded by the wire timeout on
//! both send and receive so a missing or wedged daemon cannot block the
//! caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::{IpcError, MOD_NAME, Reply, ReplyStatus, Request};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const READY_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Client side of the request/reply endpoint.
#[derive(Debug, Clone)]
pub struct NetconnectClient {
    path: PathBuf,
}

impl NetconnectClient {
    /// Client for the endpoint at the given socket path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Echo two values, for connectivity testing.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn echo(&self, a: Value, b: Value) -> Result<Value, IpcError> {
        self.send_cmd("echo", vec![a, b], COMMAND_TIMEOUT).await
    }

    /// Block until the daemon answers an echo.
    pub async fn wait_for_ready(&self) {
        loop {
            let probe = self
                .send_cmd(
                    "echo",
                    vec![Value::from("a"), Value::from("b")],
                    READY_PROBE_TIMEOUT,
                )
                .await;
            if probe.is_ok() {
                return;
            }
        }
    }

    /// Aggregated daemon status.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn status(&self) -> Result<Value, IpcError> {
        self.send_cmd("status", Vec::new(), COMMAND_TIMEOUT).await
    }

    /// Apply a connection configuration.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn connect(&self, config: Value) -> Result<Value, IpcError> {
        self.send_cmd("connect", vec![config], COMMAND_TIMEOUT).await
    }

    /// Live information about one connection kind.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn connection_info(&self, conn: &str) -> Result<Value, IpcError> {
        self.send_cmd("connection_info", vec![Value::from(conn)], COMMAND_TIMEOUT)
            .await
    }

    /// Scan for Wi-Fi networks.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn wifi_scan(&self) -> Result<Value, IpcError> {
        self.send_cmd("wifi_scan", Vec::new(), COMMAND_TIMEOUT).await
    }

    /// List enumerable network interfaces.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn interfaces(&self) -> Result<Value, IpcError> {
        self.send_cmd("interfaces", Vec::new(), COMMAND_TIMEOUT)
            .await
    }

    /// Trigger an immediate online re-check.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn online_check(&self) -> Result<Value, IpcError> {
        self.send_cmd("online_check", Vec::new(), COMMAND_TIMEOUT)
            .await
    }

    /// Update manager-scope configuration.
    ///
    /// # Errors
    /// Returns [`IpcError`] on transport failure or an error reply.
    pub async fn config(&self, config: Value) -> Result<Value, IpcError> {
        self.send_cmd("config", vec![config], COMMAND_TIMEOUT).await
    }

    async fn send_cmd(
        &self,
        func: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, IpcError> {
        let request = Request {
            src_mid: MOD_NAME.to_string(),
            func: func.to_string(),
            params,
        };
        let mut wire = serde_json::to_string(&request)?;
        wire.push('\n');

        let stream = tokio::time::timeout(timeout, UnixStream::connect(&self.path))
            .await
            .map_err(|_| IpcError::Timeout)??;
        let (reader, mut writer) = stream.into_split();

        tokio::time::timeout(timeout, writer.write_all(wire.as_bytes()))
            .await
            .map_err(|_| IpcError::Timeout)??;

        let mut lines = BufReader::new(reader).lines();
        let line = tokio::time::timeout(timeout, lines.next_line())
            .await
            .map_err(|_| IpcError::Timeout)??
            .ok_or(IpcError::Closed)?;

        let reply: Reply = serde_json::from_str(&line)?;
        match reply.status {
            ReplyStatus::Success => Ok(reply.message),
            ReplyStatus::Error => Err(IpcError::Remote(format!(
                "{} {}",
                reply.mod_name,
                reply.message.as_str().unwrap_or_default()
            ))),
        }
    }
}
