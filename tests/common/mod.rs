#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for quiz room sync integration tests.
//!
//! Provides a scripted [`MockTransport`], a counting [`MockConnector`] and
//! helper functions for constructing server frames as JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use quiz_room_sync::{Connector, SyncError, Transport};
use serde_json::{json, Value};

/// One scripted `recv()` result. `None` closes the connection cleanly.
pub type Incoming = Option<Result<String, SyncError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted transport for integration testing.
///
/// Scripted server frames are consumed in order by `recv()`; once the
/// script is exhausted `recv()` stays pending, like an idle connection.
pub struct MockTransport {
    incoming: VecDeque<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a standalone transport, returning handles to the sent frames
    /// and the close flag.
    pub fn new(incoming: Vec<Incoming>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let live = Arc::new(AtomicUsize::new(1));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            live,
        };
        (transport, sent, closed)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SyncError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Outcome of one scripted connect attempt.
pub enum Attempt {
    /// Connect successfully and replay these frames.
    Accept(Vec<Incoming>),
    /// Fail to connect.
    Refuse,
    /// Take `delay` to connect, then replay these frames.
    Slow(Duration, Vec<Incoming>),
}

/// Counters shared between a [`MockConnector`] and the test body.
#[derive(Clone, Default)]
pub struct ConnectorProbe {
    /// Every frame sent on any connection, in order.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Number of `connect()` calls.
    pub attempts: Arc<AtomicUsize>,
    /// Transports currently alive.
    pub live: Arc<AtomicUsize>,
    /// Highest number of transports ever alive at once.
    pub peak_live: Arc<AtomicUsize>,
    /// Whether the most recent transport was closed gracefully.
    pub closed: Arc<AtomicBool>,
}

impl ConnectorProbe {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    /// Sent frames parsed as JSON.
    pub fn sent_frames(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }
}

/// A connector that hands out one scripted [`MockTransport`] per attempt.
///
/// Attempts beyond the script connect to an idle transport.
pub struct MockConnector {
    attempts: VecDeque<Attempt>,
    probe: ConnectorProbe,
}

impl MockConnector {
    pub fn new(attempts: Vec<Attempt>) -> (Self, ConnectorProbe) {
        let probe = ConnectorProbe::default();
        let connector = Self {
            attempts: VecDeque::from(attempts),
            probe: probe.clone(),
        };
        (connector, probe)
    }

    /// A connector whose first connection replays `incoming`.
    pub fn single(incoming: Vec<Incoming>) -> (Self, ConnectorProbe) {
        Self::new(vec![Attempt::Accept(incoming)])
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, SyncError> {
        self.probe.attempts.fetch_add(1, Ordering::SeqCst);
        let incoming = match self.attempts.pop_front() {
            Some(Attempt::Accept(incoming)) => incoming,
            Some(Attempt::Refuse) => {
                return Err(SyncError::Connect("connection refused".into()));
            }
            Some(Attempt::Slow(delay, incoming)) => {
                tokio::time::sleep(delay).await;
                incoming
            }
            None => Vec::new(),
        };

        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak_live.fetch_max(live, Ordering::SeqCst);
        self.probe.closed.store(false, Ordering::Relaxed);

        Ok(MockTransport {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&self.probe.sent),
            closed: Arc::clone(&self.probe.closed),
            live: Arc::clone(&self.probe.live),
        })
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Wrap a payload in a wire frame.
pub fn frame(event: &str, payload: Value) -> String {
    json!({ "event": event, "payload": payload }).to_string()
}

pub fn participant(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "avatar": null })
}

pub fn player(id: &str, score: i64, bet: Option<i64>, connected: bool) -> Value {
    json!({
        "id": id,
        "name": id.to_uppercase(),
        "avatar": null,
        "score": score,
        "betAmount": bet,
        "isConnected": connected,
    })
}

/// A room payload hosted by `host` with players `p1` and `p2`.
pub fn room_payload(state: &str, current_player: Option<&str>) -> Value {
    json!({
        "id": "room-1",
        "name": "Friday quiz",
        "packPreview": { "id": "pack-1", "name": "General knowledge" },
        "host": { "id": "host", "name": "Hoster", "avatar": null, "isConnected": true },
        "players": [player("p1", 0, None, true), player("p2", 0, None, true)],
        "state": state,
        "currentRoundName": "Round 1",
        "currentRoundQuestions": {
            "History": [
                { "index": 0, "value": 100, "hasBeenPlayed": false },
                { "index": 1, "value": 200, "hasBeenPlayed": true }
            ],
            "Music": [
                { "index": 0, "value": 100, "hasBeenPlayed": false }
            ]
        },
        "currentPlayer": current_player,
        "currentQuestion": null,
        "answeringPlayer": null,
        "allowedToAnswer": null,
        "finalRoundState": null,
        "pausedState": { "paused": false, "pausedAt": null }
    })
}

pub fn room_updated_json(state: &str, current_player: Option<&str>) -> String {
    frame("room_updated", room_payload(state, current_player))
}

pub fn room_deleted_json() -> String {
    frame("room_deleted", json!({ "id": "room-1" }))
}

pub fn chat_json(from_id: &str, text: &str) -> String {
    frame(
        "chat",
        json!({ "from": participant(from_id, "Ann"), "text": text }),
    )
}

pub fn error_json(message: &str) -> String {
    frame("error", json!({ "error": message }))
}

pub fn round_demo_json(name: &str, categories: &[&str]) -> String {
    frame("round_demo", json!({ "name": name, "categories": categories }))
}

pub fn correct_answer_demo_json(answers: &[&str], duration: u64) -> String {
    frame(
        "correct_answer_demo",
        json!({ "answers": answers, "comment": null, "duration": duration }),
    )
}
