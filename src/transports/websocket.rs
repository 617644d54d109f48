//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries room frames over one WebSocket connection;
//! [`WebSocketConnector`] dials a fixed URL each time the session needs a
//! fresh connection. [`Endpoint`] builds the server's room and lobby URLs.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quiz_room_sync::SyncError> {
//! use quiz_room_sync::{Endpoint, Transport, WebSocketTransport};
//!
//! let url = Endpoint::room("ws://localhost:8080", "room-1");
//! let mut transport = WebSocketTransport::connect(&url).await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::SyncError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Default timeout for establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Endpoint ────────────────────────────────────────────────────────

/// Builders for the server's persistent-connection URLs.
pub struct Endpoint;

impl Endpoint {
    /// URL of a room's connection: `{base}/ws/room/{room_id}`.
    pub fn room(base: &str, room_id: &str) -> String {
        format!("{}/ws/room/{room_id}", base.trim_end_matches('/'))
    }

    /// URL of the lobby connection: `{base}/ws/lobby`.
    ///
    /// A URL helper only. The lobby pushes room listings, not room
    /// snapshots, so a [`RoomClient`](crate::RoomClient) must not be pointed
    /// at it; its `room_updated` frames would be dropped as malformed.
    pub fn lobby(base: &str) -> String {
        format!("{}/ws/lobby", base.trim_end_matches('/'))
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not consume any frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the URL is invalid or the connection cannot
    /// be established. I/O error kinds are preserved; all other failures map
    /// to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        tracing::debug!(url = %url, "connecting to room server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            SyncError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] if the deadline elapses, or any error
    /// [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, SyncError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(SyncError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Dials the same WebSocket URL for every (re)connection.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set how long a single connection attempt may take. Defaults to **10 seconds**.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&mut self) -> Result<WebSocketTransport, SyncError> {
        WebSocketTransport::connect_with_timeout(&self.url, self.connect_timeout).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn endpoint_urls() {
        assert_eq!(
            Endpoint::room("ws://host:8080/api/", "abc"),
            "ws://host:8080/api/ws/room/abc"
        );
        assert_eq!(Endpoint::lobby("ws://host:8080"), "ws://host:8080/ws/lobby");
    }

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
        assert_send::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[tokio::test]
    async fn connector_times_out_on_unroutable_host() {
        let mut connector = WebSocketConnector::new("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout | SyncError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the first
    /// accepted connection and return its URL.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_yields_text_frames_and_skips_binary() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"event":"chat"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"event":"chat"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn connector_dials_configured_url() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut connector = WebSocketConnector::new(url.clone());
        assert_eq!(connector.url(), url);
        let mut transport = connector.connect().await.unwrap();
        transport
            .send(r#"{"event":"start_game"}"#.to_string())
            .await
            .unwrap();
        let echoed = transport.recv().await.unwrap().unwrap();
        assert_eq!(echoed, r#"{"event":"start_game"}"#);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Closing twice is a no-op.
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportClosed));
    }
}
