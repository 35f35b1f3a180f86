use thiserror::Error;

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum NetconnectError {
    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or socket failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request/reply endpoint failure.
    #[error("IPC error: {0}")]
    Ipc(#[from] crate::ipc::IpcError),

    /// Logger initialization failure.
    #[error("Tracing setup failed: {0}")]
    Tracing(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NetconnectError>;
