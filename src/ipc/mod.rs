//! Request/reply endpoint.
//!
//! Transport is a Unix stream socket carrying newline-delimited JSON.
//! Requests are `{src_mid, func, params}`; replies are
//! `{mod_name, status, message}`. Requests are served one at a time, like
//! the strict request/reply channel the front-end expects.

/// Client helper with bounded send/receive.
pub mod client;
/// Endpoint server and dispatch seam.
pub mod server;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use client::NetconnectClient;
pub use server::{Dispatch, IpcServer};

/// Module name stamped into every reply.
pub const MOD_NAME: &str = "netconnect-interface";

/// IPC-layer failure.
#[derive(Error, Debug)]
pub enum IpcError {
    /// Socket-level failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Send or receive exceeded its bound.
    #[error("timed out")]
    Timeout,

    /// Malformed request or reply.
    #[error("invalid message: {0}")]
    Serde(#[from] serde_json::Error),

    /// The peer replied with `status = error`.
    #[error("{0}")]
    Remote(String),

    /// The peer closed the connection before replying.
    #[error("connection closed")]
    Closed,
}

/// One request on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Module name of the sender.
    #[serde(default)]
    pub src_mid: String,
    /// Operation to invoke.
    pub func: String,
    /// Positional operation parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Operation completed; `message` carries the result.
    Success,
    /// Operation failed; `message` carries the error text.
    Error,
}

/// One reply on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Module name of the responder.
    pub mod_name: String,
    /// Outcome of the operation.
    pub status: ReplyStatus,
    /// Result value or error text.
    pub message: Value,
}

impl Reply {
    /// Successful reply carrying a result.
    pub fn success(message: Value) -> Self {
        Self {
            mod_name: MOD_NAME.to_string(),
            status: ReplyStatus::Success,
            message,
        }
    }

    /// Error reply carrying a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            mod_name: MOD_NAME.to_string(),
            status: ReplyStatus::Error,
            message: Value::String(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn request_roundtrip() {
        let wire = r#"{"src_mid": "frontend", "func": "echo", "params": ["a", "b"]}"#;

        let request: Request = serde_json::from_str(wire).unwrap();
        assert_eq!(request.func, "echo");
        assert_eq!(request.params, vec![json!("a"), json!("b")]);

        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back["src_mid"], "frontend");
    }

    #[test]
    fn request_params_default_to_empty() {
        let request: Request = serde_json::from_str(r#"{"func": "status"}"#).unwrap();

        assert!(request.params.is_empty());
        assert!(request.src_mid.is_empty());
    }

    #[test]
    fn reply_wire_shape() {
        let reply = Reply::success(json!(["a", "b"]));
        let value = serde_json::to_value(&reply).unwrap();

        assert_eq!(value["mod_name"], "netconnect-interface");
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], json!(["a", "b"]));

        let error = serde_json::to_value(Reply::error("boom")).unwrap();
        assert_eq!(error["status"], "error");
        assert_eq!(error["message"], "boom");
    }
}
