//! Routing of inbound server events to room state.
//!
//! The [`EventDispatcher`] owns everything one room view mutates: the
//! snapshot store, the overlay queue and the chat history. Each inbound
//! [`ServerEvent`] is matched exhaustively; unknown events and malformed
//! payloads are logged and dropped without touching state.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::RoomEvent;
use crate::model::{ChatMessage, RoomSnapshot};
use crate::overlay::{Overlay, OverlayQueue};
use crate::protocol::ServerEvent;
use crate::store::RoomStateStore;

/// Applies server events to one room view's state.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    store: RoomStateStore,
    overlays: OverlayQueue,
    chat: VecDeque<ChatMessage>,
    chat_history_limit: usize,
}

impl EventDispatcher {
    pub fn new(store: RoomStateStore, overlays: OverlayQueue, chat_history_limit: usize) -> Self {
        Self {
            store,
            overlays,
            chat: VecDeque::new(),
            chat_history_limit,
        }
    }

    pub fn snapshot(&self) -> Option<&Arc<RoomSnapshot>> {
        self.store.current()
    }

    pub fn store(&self) -> &RoomStateStore {
        &self.store
    }

    pub fn overlays(&self) -> &OverlayQueue {
        &self.overlays
    }

    /// Chat lines, oldest first.
    pub fn chat(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    /// Decode one text frame and dispatch it.
    ///
    /// Frames that fail to decode are dropped with a warning.
    pub fn dispatch_text(&mut self, text: &str, now: Instant) -> Option<RoomEvent> {
        match ServerEvent::from_text(text) {
            Ok(event) => self.dispatch(event, now),
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                None
            }
        }
    }

    /// Apply `event` and return the notification it produces, if any.
    pub fn dispatch(&mut self, event: ServerEvent, now: Instant) -> Option<RoomEvent> {
        match event {
            ServerEvent::RoomUpdated(snapshot) => {
                debug!(phase = %snapshot.state, "room snapshot replaced");
                let snapshot = self.store.replace(*snapshot);
                Some(RoomEvent::RoomUpdated { snapshot })
            }
            ServerEvent::RoomDeleted(deleted) => {
                debug!(room_id = %deleted.id, "room deleted");
                self.overlays.clear();
                Some(RoomEvent::RoomDeleted {
                    room_id: deleted.id,
                })
            }
            ServerEvent::Chat(message) => {
                self.push_chat(message.clone());
                Some(RoomEvent::Chat { message })
            }
            ServerEvent::Error(notice) => {
                warn!(error = %notice.error, "server reported an error");
                Some(RoomEvent::ServerError {
                    message: notice.error,
                })
            }
            ServerEvent::RoundIntro(intro) => {
                let before = self.overlays.active().cloned();
                self.overlays.on_intro(intro, now);
                self.overlay_changed_since(before)
            }
            ServerEvent::AnswerReveal(reveal) => {
                let before = self.overlays.active().cloned();
                self.overlays.on_reveal(reveal, now);
                self.overlay_changed_since(before)
            }
            ServerEvent::Unrecognized { event } => {
                debug!(event = %event, "no handler for event, dropping");
                None
            }
        }
    }

    /// When the next overlay transition is due.
    pub fn next_overlay_deadline(&self) -> Option<Instant> {
        self.overlays.next_deadline()
    }

    /// Fire due overlay transitions. Returns a notification if the overlay changed.
    pub fn expire_overlays(&mut self, now: Instant) -> Option<RoomEvent> {
        self.overlays.tick(now).then(|| self.overlay_changed())
    }

    fn overlay_changed(&self) -> RoomEvent {
        RoomEvent::OverlayChanged {
            overlay: self.overlays.active().cloned(),
        }
    }

    /// A queued intro leaves the screen as it was; only report real changes.
    fn overlay_changed_since(&self, before: Option<Overlay>) -> Option<RoomEvent> {
        (self.overlays.active() != before.as_ref()).then(|| self.overlay_changed())
    }

    fn push_chat(&mut self, message: ChatMessage) {
        if self.chat_history_limit == 0 {
            return;
        }
        while self.chat.len() >= self.chat_history_limit {
            self.chat.pop_front();
        }
        self.chat.push_back(message);
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
    use crate::overlay::{IntroTiming, OverlayState};
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(
            RoomStateStore::new(),
            OverlayQueue::new(IntroTiming::default()),
            3,
        )
    }

    fn room_json(state: &str, current: Option<&str>) -> String {
        json!({
            "event": "room_updated",
            "payload": {
                "id": "room-1",
                "name": "Friday quiz",
                "packPreview": {"id": "pack-1", "name": "General"},
                "host": {"id": "host", "name": "Host", "avatar": null, "isConnected": true},
                "players": null,
                "state": state,
                "currentRoundName": null,
                "currentRoundQuestions": null,
                "currentPlayer": current,
                "currentQuestion": null,
                "answeringPlayer": null,
                "allowedToAnswer": null,
                "finalRoundState": null,
                "pausedState": {"paused": false, "pausedAt": null}
            }
        })
        .to_string()
    }

    fn chat_json(text: &str) -> String {
        json!({
            "event": "chat",
            "payload": {"from": {"id": "", "name": "", "avatar": null}, "text": text}
        })
        .to_string()
    }

    #[test]
    fn room_updated_replaces_snapshot() {
        let mut d = dispatcher();
        let now = Instant::now();

        let event = d.dispatch_text(&room_json("selecting_question", Some("p1")), now);
        assert!(matches!(event, Some(RoomEvent::RoomUpdated { .. })));
        d.dispatch_text(&room_json("showing_question", None), now);

        let snapshot = d.snapshot().unwrap();
        assert_eq!(snapshot.state.as_str(), "showing_question");
        assert!(snapshot.current_player.is_none());
        assert_eq!(d.store().revision(), 2);
    }

    #[test]
    fn unknown_event_changes_nothing() {
        let mut d = dispatcher();
        let now = Instant::now();
        d.dispatch_text(&room_json("selecting_question", Some("p1")), now);
        let before = d.snapshot().cloned();

        let event = d.dispatch_text(r#"{"event":"future_feature","payload":{}}"#, now);
        assert!(event.is_none());
        assert_eq!(d.snapshot().cloned(), before);
        assert_eq!(d.overlays().state(), OverlayState::Idle);
        assert_eq!(d.store().revision(), 1);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let mut d = dispatcher();
        let now = Instant::now();
        d.dispatch_text(&room_json("selecting_question", Some("p1")), now);

        assert!(d
            .dispatch_text(r#"{"event":"room_updated","payload":{"id":42}}"#, now)
            .is_none());
        assert!(d
            .dispatch_text(r#"{"event":"round_demo","payload":"oops"}"#, now)
            .is_none());
        assert!(d.dispatch_text("not json", now).is_none());

        assert_eq!(d.store().revision(), 1);
        assert!(d.overlays().active().is_none());
    }

    #[test]
    fn server_error_leaves_snapshot_alone() {
        let mut d = dispatcher();
        let now = Instant::now();
        d.dispatch_text(&room_json("betting", None), now);

        let event = d.dispatch_text(
            r#"{"event":"error","payload":{"error":"can not place bet again"}}"#,
            now,
        );
        assert_eq!(
            event,
            Some(RoomEvent::ServerError {
                message: "can not place bet again".into()
            })
        );
        assert_eq!(d.store().revision(), 1);
    }

    #[test]
    fn chat_history_is_bounded() {
        let mut d = dispatcher();
        let now = Instant::now();
        for n in 0..5 {
            d.dispatch_text(&chat_json(&format!("line {n}")), now);
        }
        let texts: Vec<_> = d.chat().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["line 2", "line 3", "line 4"]);
        assert!(d.chat().all(ChatMessage::is_system));
    }

    #[test]
    fn overlays_follow_reveal_then_intro() {
        let mut d = dispatcher();
        let t0 = Instant::now();

        d.dispatch_text(
            r#"{"event":"correct_answer_demo","payload":{"answers":["Paris"],"comment":null,"duration":5}}"#,
            t0,
        );
        let queued = d.dispatch_text(
            r#"{"event":"round_demo","payload":{"name":"Round 2","categories":["Art","Film"]}}"#,
            t0 + Duration::from_secs(1),
        );
        assert!(queued.is_none(), "a queued intro does not change the screen");
        assert_eq!(d.next_overlay_deadline(), Some(t0 + Duration::from_secs(5)));
        assert!(d.expire_overlays(t0 + Duration::from_secs(4)).is_none());

        match d.expire_overlays(t0 + Duration::from_secs(5)) {
            Some(RoomEvent::OverlayChanged {
                overlay: Some(Overlay::Intro(intro)),
            }) => assert_eq!(intro.round_name, "Round 2"),
            other => panic!("expected intro overlay, got {other:?}"),
        }
    }

    #[test]
    fn room_deleted_clears_overlays() {
        let mut d = dispatcher();
        let now = Instant::now();
        d.dispatch_text(
            r#"{"event":"round_demo","payload":{"name":"Round 1","categories":[]}}"#,
            now,
        );
        let event = d.dispatch_text(r#"{"event":"room_deleted","payload":{"id":"room-1"}}"#, now);
        assert_eq!(
            event,
            Some(RoomEvent::RoomDeleted {
                room_id: "room-1".into()
            })
        );
        assert!(d.overlays().active().is_none());
    }
}
