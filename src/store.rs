//! Holder of the latest authoritative room snapshot.

use std::sync::Arc;

use crate::model::RoomSnapshot;

/// The single current [`RoomSnapshot`] of a room view.
///
/// [`replace`](RoomStateStore::replace) is the only mutator. There is no merge:
/// frames arrive in send order on one connection, so the most recent
/// `room_updated` always wins.
#[derive(Debug, Default, Clone)]
pub struct RoomStateStore {
    current: Option<Arc<RoomSnapshot>>,
    revision: u64,
}

impl RoomStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a snapshot fetched out of band (initial page load).
    pub fn with_initial(snapshot: RoomSnapshot) -> Self {
        let mut store = Self::new();
        store.replace(snapshot);
        store
    }

    /// Replace the snapshot wholesale and return the shared handle to it.
    pub fn replace(&mut self, next: RoomSnapshot) -> Arc<RoomSnapshot> {
        let next = Arc::new(next);
        self.current = Some(Arc::clone(&next));
        self.revision += 1;
        next
    }

    pub fn current(&self) -> Option<&Arc<RoomSnapshot>> {
        self.current.as_ref()
    }

    /// Number of replacements applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
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
    use crate::model::{PackPreview, PausedState, RoomPhase};

    fn snapshot(phase: RoomPhase, current_player: Option<&str>) -> RoomSnapshot {
        RoomSnapshot {
            id: "room-1".into(),
            name: "Friday quiz".into(),
            pack_preview: PackPreview {
                id: "pack-1".into(),
                name: "General".into(),
            },
            host: None,
            players: vec![],
            state: phase,
            current_round_name: None,
            current_round_questions: None,
            current_player: current_player.map(Into::into),
            current_question: None,
            answering_player: None,
            allowed_to_answer: vec![],
            final_round_state: None,
            paused_state: PausedState::default(),
        }
    }

    #[test]
    fn empty_store_has_no_snapshot() {
        let store = RoomStateStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn nth_snapshot_is_exactly_the_nth_payload() {
        let payloads = vec![
            snapshot(RoomPhase::SelectingQuestion, Some("p1")),
            snapshot(RoomPhase::ShowingQuestion, None),
            snapshot(RoomPhase::Answering, Some("p2")),
        ];

        let mut store = RoomStateStore::new();
        for (n, payload) in payloads.iter().enumerate() {
            store.replace(payload.clone());
            assert_eq!(store.current().unwrap().as_ref(), payload);
            assert_eq!(store.revision(), n as u64 + 1);
        }
    }

    #[test]
    fn replacement_drops_fields_absent_from_the_new_snapshot() {
        let mut store =
            RoomStateStore::with_initial(snapshot(RoomPhase::SelectingQuestion, Some("p1")));
        store.replace(snapshot(RoomPhase::ShowingQuestion, None));
        assert!(store.current().unwrap().current_player.is_none());
    }
}
