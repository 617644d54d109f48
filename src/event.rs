//! Notifications from the session loop to the embedding UI.

use std::sync::Arc;
use std::time::Duration;

use crate::model::{ChatMessage, RoomId, RoomSnapshot};
use crate::overlay::Overlay;

/// Events emitted by a [`RoomClient`](crate::RoomClient) on its event channel.
///
/// `RoomDeleted` and `Closed` are terminal: no event follows them and the
/// channel closes once the session task has exited.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A connection is open. `generation` increases with every reconnect.
    Connected { generation: u64 },

    /// The connection was lost or could not be opened. Another attempt
    /// follows after `retry_in`.
    Disconnected {
        reason: Option<String>,
        retry_in: Duration,
    },

    /// A new authoritative snapshot replaced the previous one.
    RoomUpdated { snapshot: Arc<RoomSnapshot> },

    /// A chat line arrived.
    Chat { message: ChatMessage },

    /// The server rejected something. Room state is unchanged.
    ServerError { message: String },

    /// The overlay on top of the phase view changed; `None` means no overlay.
    OverlayChanged { overlay: Option<Overlay> },

    /// The room is gone. The session has ended and will not reconnect.
    RoomDeleted { room_id: RoomId },

    /// The session was shut down locally.
    Closed,
}

impl RoomEvent {
    /// Returns `true` for events after which the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RoomDeleted { .. } | Self::Closed)
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

    #[test]
    fn only_deletion_and_close_are_terminal() {
        assert!(RoomEvent::Closed.is_terminal());
        assert!(RoomEvent::RoomDeleted {
            room_id: "room-1".into()
        }
        .is_terminal());
        assert!(!RoomEvent::Disconnected {
            reason: None,
            retry_in: Duration::from_secs(3)
        }
        .is_terminal());
        assert!(!RoomEvent::Connected { generation: 2 }.is_terminal());
    }
}
