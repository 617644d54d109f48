//! Error types for the room synchronization client.

use thiserror::Error;

/// Errors that can occur while synchronizing a room view.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// A connection to the server could not be established.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to serialize or deserialize a frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound frame carried a known event name with a payload of the wrong shape.
    #[error("malformed `{event}` payload: {reason}")]
    MalformedPayload {
        /// Event name of the offending frame.
        event: String,
        /// Decoder message describing the mismatch.
        reason: String,
    },

    /// A local action was suppressed because the current room phase does not permit it.
    #[error("action `{action}` is not permitted right now")]
    NotPermitted {
        /// Wire name of the suppressed command.
        action: &'static str,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for room synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
