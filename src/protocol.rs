//! Wire format of the room connection.
//!
//! Both directions exchange one JSON object per message:
//! `{"event": <string>, "payload": <value>}`. Inbound frames decode in two
//! steps: first structurally into a [`Frame`], then into the closed
//! [`ServerEvent`] sum type. Event names this client does not know map to
//! [`ServerEvent::Unrecognized`] rather than an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::model::{AnswerReveal, ChatMessage, RoomId, RoomSnapshot, RoundIntro};

// ── Event names ─────────────────────────────────────────────────────

pub const ROOM_UPDATED: &str = "room_updated";
pub const ROOM_DELETED: &str = "room_deleted";
pub const CHAT: &str = "chat";
pub const ERROR: &str = "error";
pub const ROUND_DEMO: &str = "round_demo";
pub const CORRECT_ANSWER_DEMO: &str = "correct_answer_demo";

// ── Frame ───────────────────────────────────────────────────────────

/// A raw inbound message before its payload has been interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    /// Parse a text message into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] if the text is not a JSON object
    /// with a string `event` field.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Payload of `room_deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDeleted {
    pub id: RoomId,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub error: String,
}

/// Every inbound event this client understands, plus a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Full replacement snapshot (boxed to reduce enum size).
    RoomUpdated(Box<RoomSnapshot>),
    /// The room no longer exists.
    RoomDeleted(RoomDeleted),
    /// A chat line.
    Chat(ChatMessage),
    /// A domain error reported by the server for one of our commands.
    Error(ErrorNotice),
    /// Round introduction overlay (`round_demo`).
    RoundIntro(RoundIntro),
    /// Correct-answer reveal overlay (`correct_answer_demo`).
    AnswerReveal(AnswerReveal),
    /// An event name this client does not handle.
    Unrecognized { event: String },
}

impl ServerEvent {
    /// Interpret a frame's payload according to its event name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedPayload`] when a known event carries a
    /// payload of the wrong shape.
    pub fn decode(frame: Frame) -> Result<Self> {
        let Frame { event, payload } = frame;
        let decoded = match event.as_str() {
            ROOM_UPDATED => Self::RoomUpdated(Box::new(payload_as(&event, payload)?)),
            ROOM_DELETED => Self::RoomDeleted(payload_as(&event, payload)?),
            CHAT => Self::Chat(payload_as(&event, payload)?),
            ERROR => Self::Error(payload_as(&event, payload)?),
            ROUND_DEMO => Self::RoundIntro(payload_as(&event, payload)?),
            CORRECT_ANSWER_DEMO => Self::AnswerReveal(payload_as(&event, payload)?),
            _ => Self::Unrecognized { event },
        };
        Ok(decoded)
    }

    /// Parse and decode a text message in one step.
    ///
    /// # Errors
    ///
    /// See [`Frame::parse`] and [`ServerEvent::decode`].
    pub fn from_text(text: &str) -> Result<Self> {
        Self::decode(Frame::parse(text)?)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            Self::RoomUpdated(_) => ROOM_UPDATED,
            Self::RoomDeleted(_) => ROOM_DELETED,
            Self::Chat(_) => CHAT,
            Self::Error(_) => ERROR,
            Self::RoundIntro(_) => ROUND_DEMO,
            Self::AnswerReveal(_) => CORRECT_ANSWER_DEMO,
            Self::Unrecognized { event } => event,
        }
    }
}

fn payload_as<T: DeserializeOwned>(event: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| SyncError::MalformedPayload {
        event: event.to_owned(),
        reason: e.to_string(),
    })
}

// ── Outbound ────────────────────────────────────────────────────────

/// Commands sent from the client to the server.
///
/// Each user intent maps to exactly one command; no local state changes
/// until the server answers with `room_updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Pick a board cell.
    SelectQuestion { category: String, index: u32 },
    /// Hand a cat-in-bag question to another player.
    #[serde(rename_all = "camelCase")]
    PassQuestion { pass_to: String },
    /// Auction bet.
    PlaceBet { amount: i64 },
    /// Host verdict on the answering player's answer.
    #[serde(rename_all = "camelCase")]
    ValidateAnswer { is_correct: bool },
    /// Strike a category from the final-round pool.
    RemoveFinalRoundCategory { category: String },
    /// Final-round wager.
    PlaceFinalRoundBet { amount: i64 },
    /// Free-text final-round answer.
    SubmitFinalRoundAnswer { answer: String },
    /// Host verdict on the current player's final-round answer.
    #[serde(rename_all = "camelCase")]
    ValidateFinalRoundAnswer { is_correct: bool },
    /// Buzz in.
    SubmitAnswer,
    /// Host starts the game.
    StartGame,
    /// Host pauses or resumes the game.
    TogglePause,
    /// Chat line.
    Chat { text: String },
}

impl ClientCommand {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectQuestion { .. } => "select_question",
            Self::PassQuestion { .. } => "pass_question",
            Self::PlaceBet { .. } => "place_bet",
            Self::ValidateAnswer { .. } => "validate_answer",
            Self::RemoveFinalRoundCategory { .. } => "remove_final_round_category",
            Self::PlaceFinalRoundBet { .. } => "place_final_round_bet",
            Self::SubmitFinalRoundAnswer { .. } => "submit_final_round_answer",
            Self::ValidateFinalRoundAnswer { .. } => "validate_final_round_answer",
            Self::SubmitAnswer => "submit_answer",
            Self::StartGame => "start_game",
            Self::TogglePause => "toggle_pause",
            Self::Chat { .. } => "chat",
        }
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
    use serde_json::json;

    #[test]
    fn unknown_event_is_unrecognized_not_an_error() {
        let event = ServerEvent::from_text(r#"{"event":"future_feature","payload":{}}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Unrecognized {
                event: "future_feature".into()
            }
        );
    }

    #[test]
    fn frame_without_payload_defaults_to_null() {
        let frame = Frame::parse(r#"{"event":"room_deleted"}"#).unwrap();
        assert_eq!(frame.payload, serde_json::Value::Null);
        // room_deleted requires an id, so decoding reports a malformed payload.
        let err = ServerEvent::decode(frame).unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { ref event, .. } if event == "room_deleted"));
    }

    #[test]
    fn frame_without_event_is_rejected() {
        let err = Frame::parse(r#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, SyncError::Serialization(_)));
    }

    #[test]
    fn error_event_decodes() {
        let event = ServerEvent::from_text(r#"{"event":"error","payload":{"error":"not allowed"}}"#)
            .unwrap();
        assert_eq!(
            event,
            ServerEvent::Error(ErrorNotice {
                error: "not allowed".into()
            })
        );
        assert_eq!(event.name(), "error");
    }

    #[test]
    fn commands_serialize_with_minimal_payloads() {
        let cases = [
            (
                ClientCommand::SelectQuestion {
                    category: "Art".into(),
                    index: 3,
                },
                json!({"event": "select_question", "payload": {"category": "Art", "index": 3}}),
            ),
            (
                ClientCommand::PassQuestion {
                    pass_to: "p2".into(),
                },
                json!({"event": "pass_question", "payload": {"passTo": "p2"}}),
            ),
            (
                ClientCommand::ValidateAnswer { is_correct: true },
                json!({"event": "validate_answer", "payload": {"isCorrect": true}}),
            ),
            (
                ClientCommand::ValidateFinalRoundAnswer { is_correct: false },
                json!({"event": "validate_final_round_answer", "payload": {"isCorrect": false}}),
            ),
            (
                ClientCommand::StartGame,
                json!({"event": "start_game"}),
            ),
            (
                ClientCommand::SubmitAnswer,
                json!({"event": "submit_answer"}),
            ),
        ];
        for (command, expected) in cases {
            assert_eq!(serde_json::to_value(&command).unwrap(), expected);
            assert_eq!(expected["event"], json!(command.name()));
        }
    }
}
