//! Integration-style client tests for quiz room sync.
//!
//! Uses the shared `MockConnector` from `tests/common` to script server
//! frames per connection and verify that `RoomClient` processes them
//! correctly, including reconnects, permissions, overlays and event delivery.

mod common;

use std::time::Duration;

use quiz_room_sync::{
    BottomPanel, Overlay, RoomClient, RoomEvent, RoomPhase, RoomSnapshot, RoomSyncConfig,
    SyncError, TopPanel,
};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use common::{
    chat_json, correct_answer_demo_json, error_json, frame, room_deleted_json, room_payload,
    room_updated_json, round_demo_json, Attempt, ConnectorProbe, MockConnector,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Start a client for `viewer` whose first connection replays `frames`.
fn start_client(
    viewer: &str,
    frames: Vec<String>,
) -> (RoomClient, mpsc::Receiver<RoomEvent>, ConnectorProbe) {
    let (connector, probe) = MockConnector::single(frames.into_iter().map(|f| Some(Ok(f))).collect());
    let (client, events) = RoomClient::start(connector, RoomSyncConfig::new(viewer));
    (client, events, probe)
}

async fn next_event(rx: &mut mpsc::Receiver<RoomEvent>) -> RoomEvent {
    rx.recv().await.expect("event channel closed")
}

/// Consume events up to and including the first `RoomUpdated`.
async fn drain_until_room(rx: &mut mpsc::Receiver<RoomEvent>) {
    loop {
        if let RoomEvent::RoomUpdated { .. } = next_event(rx).await {
            return;
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Snapshot flow and permissions
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn current_player_may_select_question() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![room_updated_json("selecting_question", Some("p1"))],
    );
    drain_until_room(&mut events).await;

    let view = client.view().expect("view");
    assert!(view.permissions.can_select_question);
    assert!(matches!(view.top, TopPanel::Board { .. }));
    assert_eq!(view.bottom, BottomPanel::Buzzer { enabled: false });

    client.shutdown().await;
}

#[tokio::test]
async fn other_player_may_not_select_question() {
    let (mut client, mut events, probe) = start_client(
        "p2",
        vec![room_updated_json("selecting_question", Some("p1"))],
    );
    drain_until_room(&mut events).await;

    assert!(!client.view().unwrap().permissions.can_select_question);
    let err = client.select_question("History", 0).unwrap_err();
    assert!(matches!(
        err,
        SyncError::NotPermitted {
            action: "select_question"
        }
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(probe.sent_frames().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn select_question_sends_minimal_payload() {
    let (mut client, mut events, probe) = start_client(
        "p1",
        vec![room_updated_json("selecting_question", Some("p1"))],
    );
    drain_until_room(&mut events).await;

    client.select_question("Music", 0).unwrap();
    // Already played.
    assert!(client.select_question("History", 1).is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        probe.sent_frames(),
        vec![json!({
            "event": "select_question",
            "payload": { "category": "Music", "index": 0 }
        })]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn later_snapshot_wins() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![
            room_updated_json("selecting_question", Some("p1")),
            room_updated_json("passing", Some("p2")),
        ],
    );
    drain_until_room(&mut events).await;
    let second = match next_event(&mut events).await {
        RoomEvent::RoomUpdated { snapshot } => snapshot,
        other => panic!("expected RoomUpdated, got {other:?}"),
    };

    let snapshot = client.snapshot().unwrap();
    assert_eq!(snapshot, second);
    assert_eq!(snapshot.state, RoomPhase::Passing);
    assert_eq!(snapshot.current_player.as_deref(), Some("p2"));

    client.shutdown().await;
}

#[tokio::test]
async fn passing_targets_only_other_connected_players() {
    let mut payload = room_payload("passing", Some("p1"));
    payload["players"] = json!([
        common::player("p1", 0, None, true),
        common::player("p2", 0, None, true),
        common::player("p3", 0, None, false),
    ]);
    let (mut client, mut events, probe) =
        start_client("p1", vec![frame("room_updated", payload)]);
    drain_until_room(&mut events).await;

    let view = client.view().unwrap();
    assert_eq!(view.permissions.pass_targets, vec!["p2".to_string()]);
    assert_err!(client.pass_question("p1"));
    assert_err!(client.pass_question("p3"));
    assert_ok!(client.pass_question("p2"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        probe.sent_frames(),
        vec![json!({ "event": "pass_question", "payload": { "passTo": "p2" } })]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn betting_requires_score_and_no_prior_bet() {
    let mut payload = room_payload("betting", None);
    payload["players"] = json!([
        common::player("p1", 300, None, true),
        common::player("p2", 0, None, true),
    ]);
    let frames = vec![frame("room_updated", payload)];

    let (mut rich, mut rich_events, rich_probe) = start_client("p1", frames.clone());
    let (mut broke, mut broke_events, _) = start_client("p2", frames);
    drain_until_room(&mut rich_events).await;
    drain_until_room(&mut broke_events).await;

    assert_err!(broke.place_bet(0));
    assert_err!(rich.place_bet(301));
    assert_ok!(rich.place_bet(150));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        rich_probe.sent_frames(),
        vec![json!({ "event": "place_bet", "payload": { "amount": 150 } })]
    );

    rich.shutdown().await;
    broke.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn initial_snapshot_is_visible_before_connecting() {
    let snapshot: RoomSnapshot =
        serde_json::from_value(room_payload("waiting_for_start", None)).unwrap();
    let (connector, probe) =
        MockConnector::new(vec![Attempt::Slow(Duration::from_secs(2), vec![])]);
    let (mut client, mut events) = RoomClient::start(
        connector,
        RoomSyncConfig::new("host").with_initial_snapshot(snapshot),
    );

    assert_eq!(client.snapshot().unwrap().state, RoomPhase::WaitingForStart);
    assert!(client.view().unwrap().permissions.can_start_game);
    // Permitted, but there is no connection to carry it yet.
    assert_ok!(client.start_game());

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 1 }
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(probe.sent_frames().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_during_slow_connect_are_dropped() {
    let (connector, probe) =
        MockConnector::new(vec![Attempt::Slow(Duration::from_secs(5), vec![])]);
    let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!client.is_connected());
    assert_ok!(client.chat("typed while offline"));

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 1 }
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(probe.sent_frames().is_empty());

    assert_ok!(client.chat("online now"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        probe.sent_frames(),
        vec![json!({ "event": "chat", "payload": { "text": "online now" } })]
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_slow_connect() {
    let (connector, probe) =
        MockConnector::new(vec![Attempt::Slow(Duration::from_secs(60), vec![])]);
    let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.shutdown().await;

    assert_eq!(next_event(&mut events).await, RoomEvent::Closed);
    assert!(events.recv().await.is_none());
    assert_eq!(probe.attempts(), 1);
    assert_eq!(probe.live(), 0);
}

#[tokio::test]
async fn countdown_runs_for_showing_question() {
    let now = OffsetDateTime::now_utc();
    let mut payload = room_payload("showing_question", None);
    payload["currentQuestion"] = json!({
        "index": 0,
        "value": 100,
        "attachment": null,
        "type": "regular",
        "text": "Who painted the Mona Lisa?",
        "timerLastProgress": 0.5,
        "timerStartsAt": rfc3339(now - time::Duration::seconds(10)),
        "timerEndsAt": rfc3339(now + time::Duration::seconds(10)),
    });
    let (mut client, mut events, _probe) =
        start_client("p1", vec![frame("room_updated", payload)]);
    drain_until_room(&mut events).await;

    let view = client.view().unwrap();
    assert!(view.permissions.can_buzz);
    let countdown = client.countdown().expect("countdown");
    let progress = countdown.progress();
    assert!(progress > 0.0 && progress <= 0.5, "progress {progress}");

    client.submit_answer().unwrap();
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Unknown, malformed and error frames
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unknown_event_leaves_state_unchanged() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![
            room_updated_json("selecting_question", Some("p1")),
            frame("future_feature", json!({})),
            r#"{"event":"room_updated","payload":{"state":42}}"#.to_string(),
            chat_json("p2", "still here"),
        ],
    );
    drain_until_room(&mut events).await;
    let before = client.snapshot().unwrap();

    // The unknown and malformed frames produce no events.
    assert!(matches!(
        next_event(&mut events).await,
        RoomEvent::Chat { .. }
    ));
    assert_eq!(client.snapshot().unwrap(), before);
    assert!(client.overlay().is_none());
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_is_a_notice_only() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![
            room_updated_json("betting", None),
            error_json("insufficient bet size"),
        ],
    );
    drain_until_room(&mut events).await;
    let before = client.snapshot().unwrap();

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::ServerError {
            message: "insufficient bet size".into()
        }
    );
    assert_eq!(client.snapshot().unwrap(), before);

    client.shutdown().await;
}

#[tokio::test]
async fn chat_lines_are_kept_in_history() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![chat_json("", "Ann joined"), chat_json("p2", "hi all")],
    );
    let _ = next_event(&mut events).await; // Connected
    let _ = next_event(&mut events).await; // Chat
    let _ = next_event(&mut events).await; // Chat

    let history = client.chat_history();
    assert_eq!(history.len(), 2);
    assert!(history[0].is_system());
    assert!(!history[1].is_system());
    assert_eq!(history[1].text, "hi all");

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Overlays
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn intro_waits_for_reveal_then_expires() {
    let (mut client, mut events, _probe) = start_client(
        "p1",
        vec![
            room_updated_json("selecting_question", Some("p1")),
            correct_answer_demo_json(&["Paris"], 5),
            round_demo_json("Round 2", &["Art", "Film"]),
        ],
    );
    drain_until_room(&mut events).await;
    let start = Instant::now();

    match next_event(&mut events).await {
        RoomEvent::OverlayChanged {
            overlay: Some(Overlay::Reveal(reveal)),
        } => assert_eq!(reveal.answers, vec!["Paris".to_string()]),
        other => panic!("expected reveal, got {other:?}"),
    }
    assert!(matches!(
        client.view().unwrap().top,
        TopPanel::AnswerReveal { .. }
    ));

    match next_event(&mut events).await {
        RoomEvent::OverlayChanged {
            overlay: Some(Overlay::Intro(intro)),
        } => assert_eq!(intro.round_name, "Round 2"),
        other => panic!("expected intro, got {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_secs(5));

    // "Art, Film" fits the viewport: pauses only.
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::OverlayChanged { overlay: None }
    );
    assert!(start.elapsed() >= Duration::from_secs(9));
    assert!(matches!(client.view().unwrap().top, TopPanel::Board { .. }));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnects_once_after_fixed_delay() {
    let (connector, probe) = MockConnector::new(vec![Attempt::Accept(vec![None])]);
    let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 1 }
    );
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Disconnected {
            reason: None,
            retry_in: Duration::from_secs(3)
        }
    );
    let lost_at = Instant::now();
    assert!(!client.is_connected());
    assert_eq!(probe.live(), 0, "the lost transport is released before retrying");

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 2 }
    );
    assert!(lost_at.elapsed() >= Duration::from_secs(3));
    assert!(client.is_connected());

    // Nothing else is scheduled.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.attempts(), 2);
    assert_eq!(probe.live(), 1);
    assert_eq!(probe.peak_live(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried() {
    let (connector, probe) =
        MockConnector::new(vec![Attempt::Refuse, Attempt::Accept(vec![])]);
    let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

    match next_event(&mut events).await {
        RoomEvent::Disconnected { reason, retry_in } => {
            assert!(reason.unwrap().contains("connection refused"));
            assert_eq!(retry_in, Duration::from_secs(3));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 1 }
    );
    assert_eq!(probe.attempts(), 2);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_while_disconnected_are_dropped() {
    let (connector, probe) = MockConnector::new(vec![
        Attempt::Accept(vec![Some(Ok(room_updated_json("selecting_question", Some("p1")))), None]),
        Attempt::Accept(vec![]),
    ]);
    let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

    drain_until_room(&mut events).await;
    assert!(matches!(
        next_event(&mut events).await,
        RoomEvent::Disconnected { .. }
    ));

    client.chat("anyone?").unwrap();
    client.select_question("Music", 0).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 2 }
    );
    client.chat("back").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        probe.sent_frames(),
        vec![json!({ "event": "chat", "payload": { "text": "back" } })]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn room_deleted_ends_session() {
    let (client, mut events, probe) = start_client(
        "p1",
        vec![
            room_updated_json("game_over", None),
            room_deleted_json(),
            chat_json("", "never delivered"),
        ],
    );
    drain_until_room(&mut events).await;

    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::RoomDeleted {
            room_id: "room-1".into()
        }
    );
    assert!(events.recv().await.is_none());
    assert_eq!(probe.attempts(), 1);
    assert_eq!(probe.live(), 0);
    assert!(probe.closed.load(std::sync::atomic::Ordering::Relaxed));
    assert!(!client.is_connected());

    // Commands after the end are accepted and silently dropped.
    assert!(client.chat("hello?").is_ok());
}

#[tokio::test]
async fn shutdown_closes_transport_and_emits_closed() {
    let (mut client, mut events, probe) = start_client("p1", vec![]);
    assert_eq!(
        next_event(&mut events).await,
        RoomEvent::Connected { generation: 1 }
    );

    client.shutdown().await;

    assert_eq!(next_event(&mut events).await, RoomEvent::Closed);
    assert!(events.recv().await.is_none());
    assert!(probe.closed.load(std::sync::atomic::Ordering::Relaxed));
    assert_eq!(probe.live(), 0);
}

#[tokio::test]
async fn dropping_client_releases_transport() {
    let (client, mut events, probe) = start_client("p1", vec![]);
    let _ = next_event(&mut events).await; // Connected
    assert_eq!(probe.live(), 1);

    drop(client);
    // The aborted task drops its future, and the transport with it.
    assert!(events.recv().await.is_none());
    assert_eq!(probe.live(), 0);
}
