//! RPC error types.

use thiserror::Error;

/// Errors produced by the RPC transport.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame did not contain valid JSON for the expected record.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A frame announced a payload above the accepted maximum.
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The peer closed the connection before a reply arrived.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The reply does not answer the request that was sent.
    #[error("Response sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },

    /// The connection pool was shut down.
    #[error("Connection pool closed")]
    PoolClosed,

    /// Method names must look like `Service.Method`.
    #[error("Malformed method name: {0}")]
    MalformedMethod(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// A service with the same name is already registered.
    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Error raised by a service implementation.
    #[error("Application error: {0}")]
    Application(String),

    /// Error reported by the remote side of a call.
    #[error("Remote error: {0}")]
    Remote(String),
}

impl RpcError {
    /// Returns true if the failure happened on the wire rather than in
    /// the remote handler. A connection that saw a transport failure must
    /// not be reused.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Codec(_)
                | RpcError::FrameTooLarge { .. }
                | RpcError::ConnectionClosed
                | RpcError::SequenceMismatch { .. }
        )
    }
}

/// Convenience type alias for RPC results.
pub type Result<T> = std::result::Result<T, RpcError>;
