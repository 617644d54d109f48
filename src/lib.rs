//! # Quiz Room Sync
//!
//! Transport-agnostic client-side synchronization engine for a multiplayer
//! trivia room.
//!
//! The game server owns the game state machine. It pushes full room
//! snapshots and transient notifications over one persistent connection.
//! This crate rebuilds a consistent local view from them, resolves which
//! panels to render and which actions the viewer may take, interpolates
//! countdowns between server updates and sends the viewer's commands back.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **Self-healing**: the session reconnects after a fixed delay until shut down
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Event-driven**: receive typed [`RoomEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() {
//! use quiz_room_sync::{Endpoint, RoomClient, RoomEvent, RoomSyncConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new(Endpoint::room("ws://localhost:8080", "room-1"));
//! let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("player-7"));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RoomEvent::RoomUpdated { .. } => {
//!             if let Some(view) = client.view() {
//!                 println!("{:?}", view.top);
//!             }
//!         }
//!         RoomEvent::RoomDeleted { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.shutdown().await;
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod overlay;
pub mod phase;
pub mod protocol;
pub mod store;
pub mod timer;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{RoomClient, RoomSyncConfig, SessionState};
pub use dispatch::EventDispatcher;
pub use error::{Result, SyncError};
pub use event::RoomEvent;
pub use model::{ChatMessage, RoomPhase, RoomSnapshot};
pub use overlay::{intro_duration, IntroTiming, Overlay, OverlayQueue, OverlayState};
pub use phase::{resolve, BottomPanel, Permissions, PhaseView, TopPanel, ValidationPanel};
pub use protocol::{ClientCommand, Frame, ServerEvent};
pub use store::RoomStateStore;
pub use timer::{Countdown, CountdownSeed, TimerInterpolator};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{Endpoint, WebSocketConnector, WebSocketTransport};
