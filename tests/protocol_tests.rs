#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol decoding tests for quiz room sync.
//!
//! Feeds JSON fixtures shaped like real server output through `Frame` and
//! `ServerEvent`, and checks the exact wire shape of every `ClientCommand`.

use quiz_room_sync::model::{
    CurrentQuestion, FinalRoundState, MediaType, QuestionKind, RoomPhase,
};
use quiz_room_sync::protocol::{ClientCommand, ErrorNotice, Frame, RoomDeleted, ServerEvent};
use quiz_room_sync::SyncError;
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

/// A host's view of a room mid-question, as the server serializes it.
fn host_room_fixture() -> Value {
    json!({
        "event": "room_updated",
        "payload": {
            "id": "8c1d",
            "name": "Thursday pub quiz",
            "packPreview": { "id": "pk-42", "name": "Movies & Music" },
            "host": { "id": "h", "name": "Quizmaster", "avatar": "https://cdn/h.png", "isConnected": true },
            "players": [
                { "id": "p1", "name": "Ann", "avatar": null, "score": 500, "betAmount": null, "isConnected": true },
                { "id": "p2", "name": "Bob", "avatar": null, "score": -100, "betAmount": 200, "isConnected": false }
            ],
            "state": "showing_question",
            "currentRoundName": "Round 1",
            "currentRoundQuestions": {
                "Film": [
                    { "index": 0, "value": 100, "hasBeenPlayed": true },
                    { "index": 1, "value": 200, "hasBeenPlayed": false }
                ]
            },
            "currentPlayer": "p1",
            "currentQuestion": {
                "index": 0,
                "value": 100,
                "attachment": { "mediaType": "audio", "contentUrl": "https://cdn/theme.mp3", "duration": 12 },
                "type": "auction",
                "text": "Name the film",
                "answers": ["Jaws"],
                "comment": "1975",
                "timerLastProgress": 0.75,
                "timerStartsAt": "2026-03-01T20:00:00.000Z",
                "timerEndsAt": "2026-03-01T20:00:15.000Z"
            },
            "answeringPlayer": null,
            "allowedToAnswer": null,
            "finalRoundState": null,
            "pausedState": { "paused": false, "pausedAt": null }
        }
    })
}

fn decode(value: &Value) -> ServerEvent {
    ServerEvent::from_text(&value.to_string()).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Inbound events
// ════════════════════════════════════════════════════════════════════

#[test]
fn host_room_snapshot_decodes() {
    let ServerEvent::RoomUpdated(room) = decode(&host_room_fixture()) else {
        panic!("expected RoomUpdated");
    };

    assert_eq!(room.state, RoomPhase::ShowingQuestion);
    assert!(room.is_host("h"));
    assert!(room.is_current_player("p1"));
    assert_eq!(room.player("p2").unwrap().bet_amount, Some(200));
    assert!(!room.player("p2").unwrap().is_connected);
    assert!(room.allowed_to_answer.is_empty());

    let question = room.current_question.as_ref().unwrap();
    assert!(matches!(question, CurrentQuestion::Visible(_)));
    assert_eq!(question.kind(), QuestionKind::Auction);
    let attachment = question.attachment().unwrap();
    assert_eq!(attachment.media_type, MediaType::Audio);
    assert_eq!(attachment.duration, 12);
    let (answers, comment) = question.answer_key().unwrap();
    assert_eq!(answers, ["Jaws".to_string()]);
    assert_eq!(comment, Some("1975"));

    let board = room.current_round_questions.as_ref().unwrap();
    assert!(board["Film"][0].has_been_played);
    assert!(!board["Film"][1].has_been_played);
}

#[test]
fn player_room_snapshot_hides_answers() {
    let mut fixture = host_room_fixture();
    let question = fixture["payload"]["currentQuestion"].as_object_mut().unwrap();
    question.remove("answers");
    question.remove("comment");

    let ServerEvent::RoomUpdated(room) = decode(&fixture) else {
        panic!("expected RoomUpdated");
    };
    let question = room.current_question.as_ref().unwrap();
    assert!(matches!(question, CurrentQuestion::Hidden(_)));
    assert!(question.answer_key().is_none());
    assert_eq!(question.text(), "Name the film");
}

#[test]
fn final_round_snapshot_decodes_for_host_and_player() {
    let mut fixture = host_room_fixture();
    let payload = &mut fixture["payload"];
    payload["state"] = json!("validating_final_round_answers");
    payload["currentQuestion"] = Value::Null;
    payload["allowedToAnswer"] = json!(["p1"]);
    payload["finalRoundState"] = json!({
        "availableCategories": { "Film": false, "Music": true },
        "question": { "text": "Who composed it?", "attachment": null, "answers": ["Williams"], "comment": null },
        "players": ["p1"],
        "playersAnswers": { "p1": "John Williams" },
        "timerEndsAt": "2026-03-01T20:05:00Z"
    });

    let ServerEvent::RoomUpdated(room) = decode(&fixture) else {
        panic!("expected RoomUpdated");
    };
    let state = room.final_round_state.as_ref().unwrap();
    assert!(matches!(state, FinalRoundState::Visible(_)));
    assert_eq!(state.answer_of("p1"), Some("John Williams"));
    assert_eq!(state.available_categories(), vec!["Music".to_string()]);
    assert_eq!(room.allowed_to_answer, vec!["p1".to_string()]);

    // A player sees only who has answered.
    fixture["payload"]["finalRoundState"] = json!({
        "availableCategories": { "Film": false, "Music": true },
        "question": { "text": "Who composed it?", "attachment": null },
        "players": ["p1"],
        "playersAnswers": { "p1": true },
        "timerEndsAt": null
    });
    let ServerEvent::RoomUpdated(room) = decode(&fixture) else {
        panic!("expected RoomUpdated");
    };
    let state = room.final_round_state.as_ref().unwrap();
    assert!(matches!(state, FinalRoundState::Hidden(_)));
    assert_eq!(state.question_text(), Some("Who composed it?"));
    assert!(state.answer_of("p1").is_none());
    assert!(state.timer_ends_at().is_none());
}

#[test]
fn paused_room_carries_pause_time() {
    let mut fixture = host_room_fixture();
    fixture["payload"]["pausedState"] = json!({ "paused": true, "pausedAt": "2026-03-01T20:00:05Z" });

    let ServerEvent::RoomUpdated(room) = decode(&fixture) else {
        panic!("expected RoomUpdated");
    };
    assert!(room.is_paused());
    assert_eq!(room.paused_state.paused_at.unwrap().second(), 5);
}

#[test]
fn unknown_phase_survives_decoding() {
    let mut fixture = host_room_fixture();
    fixture["payload"]["state"] = json!("lightning_round");

    let ServerEvent::RoomUpdated(room) = decode(&fixture) else {
        panic!("expected RoomUpdated");
    };
    assert_eq!(room.state, RoomPhase::Unrecognized("lightning_round".into()));
}

#[test]
fn room_deleted_and_error_decode() {
    assert_eq!(
        decode(&json!({ "event": "room_deleted", "payload": { "id": "8c1d" } })),
        ServerEvent::RoomDeleted(RoomDeleted { id: "8c1d".into() })
    );
    assert_eq!(
        decode(&json!({ "event": "error", "payload": { "error": "game is paused" } })),
        ServerEvent::Error(ErrorNotice {
            error: "game is paused".into()
        })
    );
}

#[test]
fn chat_from_system_decodes() {
    let event = decode(&json!({
        "event": "chat",
        "payload": { "from": { "id": "", "name": "", "avatar": null }, "text": "Bob left the room" }
    }));
    let ServerEvent::Chat(message) = event else {
        panic!("expected Chat");
    };
    assert!(message.is_system());
    assert_eq!(message.text, "Bob left the room");
}

#[test]
fn overlay_events_decode() {
    let ServerEvent::RoundIntro(intro) = decode(&json!({
        "event": "round_demo",
        "payload": { "name": "Final stretch", "categories": ["Film", "Music", "Sport"] }
    })) else {
        panic!("expected RoundIntro");
    };
    assert_eq!(intro.round_name, "Final stretch");
    assert_eq!(intro.category_line(), "Film, Music, Sport");

    let ServerEvent::AnswerReveal(reveal) = decode(&json!({
        "event": "correct_answer_demo",
        "payload": { "answers": ["Jaws"], "comment": "1975" }
    })) else {
        panic!("expected AnswerReveal");
    };
    // The reveal length falls back to five seconds when omitted.
    assert_eq!(reveal.duration_seconds, 5);
    assert_eq!(reveal.comment.as_deref(), Some("1975"));
}

#[test]
fn unknown_event_name_is_unrecognized() {
    let event = decode(&json!({ "event": "player_kicked", "payload": { "id": "p2" } }));
    assert_eq!(event.name(), "player_kicked");
    assert!(matches!(event, ServerEvent::Unrecognized { .. }));
}

#[test]
fn malformed_payload_names_the_event() {
    let err = ServerEvent::from_text(r#"{"event":"round_demo","payload":{"name":7}}"#).unwrap_err();
    match err {
        SyncError::MalformedPayload { event, .. } => assert_eq!(event, "round_demo"),
        other => panic!("expected MalformedPayload, got {other:?}"),
    }
}

#[test]
fn non_json_text_is_a_serialization_error() {
    assert!(matches!(
        Frame::parse("ping").unwrap_err(),
        SyncError::Serialization(_)
    ));
}

// ════════════════════════════════════════════════════════════════════
// Outbound commands
// ════════════════════════════════════════════════════════════════════

fn wire(command: &ClientCommand) -> Value {
    serde_json::to_value(command).unwrap()
}

#[test]
fn betting_commands_carry_amount() {
    assert_eq!(
        wire(&ClientCommand::PlaceBet { amount: 250 }),
        json!({ "event": "place_bet", "payload": { "amount": 250 } })
    );
    assert_eq!(
        wire(&ClientCommand::PlaceFinalRoundBet { amount: 0 }),
        json!({ "event": "place_final_round_bet", "payload": { "amount": 0 } })
    );
}

#[test]
fn final_round_commands_use_wire_names() {
    assert_eq!(
        wire(&ClientCommand::RemoveFinalRoundCategory {
            category: "Film".into()
        }),
        json!({ "event": "remove_final_round_category", "payload": { "category": "Film" } })
    );
    assert_eq!(
        wire(&ClientCommand::SubmitFinalRoundAnswer {
            answer: "John Williams".into()
        }),
        json!({ "event": "submit_final_round_answer", "payload": { "answer": "John Williams" } })
    );
}

#[test]
fn payloadless_commands_omit_payload() {
    for command in [
        ClientCommand::SubmitAnswer,
        ClientCommand::StartGame,
        ClientCommand::TogglePause,
    ] {
        let value = wire(&command);
        assert_eq!(value, json!({ "event": command.name() }));
        assert!(value.get("payload").is_none());
    }
}

#[test]
fn chat_command_carries_text() {
    assert_eq!(
        wire(&ClientCommand::Chat {
            text: "good luck!".into()
        }),
        json!({ "event": "chat", "payload": { "text": "good luck!" } })
    );
}
