//! # Room Watch Demo
//!
//! Follows one trivia room and logs what the local viewer would see:
//!
//! 1. Connect to the game server via WebSocket (and reconnect on loss)
//! 2. Log every snapshot as the resolved top/bottom panels
//! 3. Log chat, overlays and server errors
//! 4. Shut down gracefully on Ctrl+C or when the room is deleted
//!
//! ## Running
//!
//! ```sh
//! QUIZ_ROOM_ID=8c1d QUIZ_VIEWER_ID=player-7 cargo run --example room_watch
//!
//! # Override the server URL:
//! QUIZ_ROOM_URL=ws://my-server:8080 QUIZ_ROOM_ID=8c1d cargo run --example room_watch
//! ```

use quiz_room_sync::{Endpoint, RoomClient, RoomEvent, RoomSyncConfig, WebSocketConnector};

/// Default server URL when `QUIZ_ROOM_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let base = std::env::var("QUIZ_ROOM_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let room_id = std::env::var("QUIZ_ROOM_ID")?;
    let viewer_id = std::env::var("QUIZ_VIEWER_ID").unwrap_or_else(|_| "spectator".to_string());

    let url = Endpoint::room(&base, &room_id);
    tracing::info!("Watching {url} as {viewer_id}");

    // ── Start ───────────────────────────────────────────────────────
    let connector = WebSocketConnector::new(url);
    let (mut client, mut event_rx) = RoomClient::start(connector, RoomSyncConfig::new(viewer_id));

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    RoomEvent::Connected { generation } => {
                        tracing::info!("Connected (connection #{generation})");
                    }

                    RoomEvent::Disconnected { reason, retry_in } => {
                        tracing::warn!(
                            "Disconnected: {}; retrying in {retry_in:?}",
                            reason.as_deref().unwrap_or("closed by server")
                        );
                    }

                    RoomEvent::RoomUpdated { snapshot } => {
                        tracing::info!("Room {} is now {}", snapshot.name, snapshot.state);
                        if let Some(view) = client.view() {
                            tracing::info!("  top:    {:?}", view.top);
                            tracing::info!("  bottom: {:?}", view.bottom);
                        }
                    }

                    RoomEvent::OverlayChanged { overlay } => {
                        tracing::info!("Overlay → {overlay:?}");
                    }

                    RoomEvent::Chat { message } => {
                        if message.is_system() {
                            tracing::info!("* {}", message.text);
                        } else {
                            tracing::info!("<{}> {}", message.from.name, message.text);
                        }
                    }

                    RoomEvent::ServerError { message } => {
                        tracing::error!("Server error: {message}");
                    }

                    RoomEvent::RoomDeleted { room_id } => {
                        tracing::warn!("Room {room_id} was deleted");
                        break;
                    }

                    RoomEvent::Closed => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
