//! Transport implementations for the room connection.
//!
//! Concrete [`Transport`](crate::Transport) and [`Connector`](crate::Connector)
//! implementations live behind feature gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{Endpoint, WebSocketConnector, WebSocketTransport};
