//! Transport abstraction for the room connection.
//!
//! The [`Transport`] trait is a bidirectional text message channel between
//! the client and the game server. Each message is one JSON-encoded frame.
//!
//! # Connection Setup
//!
//! Because a room view reconnects on its own after a loss, the client does
//! not take a single connected transport. It takes a [`Connector`], which is
//! asked for a fresh transport on start and after every loss.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quiz_room_sync::error::SyncError;
//! use quiz_room_sync::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SyncError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SyncError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SyncError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self) -> Result<MyTransport, SyncError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SyncError;

/// A bidirectional text message transport for room frames.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), SyncError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations must
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), SyncError>;
}

/// Produces connected transports for one endpoint.
///
/// Called once when the session starts and again after each connection loss.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport this connector yields.
    type Transport: Transport;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connect`] (or [`SyncError::Io`]/[`SyncError::Timeout`])
    /// when the connection cannot be established. The session retries after
    /// its reconnect delay.
    async fn connect(&mut self) -> Result<Self::Transport, SyncError>;
}
