//! Async room client: connection lifecycle and command emission.
//!
//! [`RoomClient`] is a thin handle that talks to a background session task
//! over an unbounded MPSC channel. The session owns the connection, the
//! snapshot store, the overlay queue and the chat history; it reconnects on
//! its own after every loss until it is shut down or the room is deleted.
//! Events are emitted on a bounded channel returned from [`RoomClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new(Endpoint::room("ws://localhost:8080", "room-1"));
//! let config = RoomSyncConfig::new("player-7");
//! let (client, mut events) = RoomClient::start(connector, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RoomEvent::RoomUpdated { .. } => {
//!             if let Some(view) = client.view() { /* render */ }
//!         }
//!         RoomEvent::RoomDeleted { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dispatch::EventDispatcher;
use crate::error::{Result, SyncError};
use crate::event::RoomEvent;
use crate::model::{ChatMessage, ParticipantId, RoomSnapshot};
use crate::overlay::{IntroTiming, Overlay, OverlayQueue};
use crate::phase::{self, PhaseView, TopPanel};
use crate::protocol::ClientCommand;
use crate::store::RoomStateStore;
use crate::timer::Countdown;
use crate::transport::{Connector, Transport};

/// Default delay before reconnecting after a connection loss.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default countdown frame interval (about 60 frames per second).
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Default number of chat lines kept in session state.
const DEFAULT_CHAT_HISTORY_LIMIT: usize = 200;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RoomClient`].
///
/// The only required field is the viewer's id; it decides which actions the
/// local guard permits.
///
/// # Example
///
/// ```
/// use quiz_room_sync::client::RoomSyncConfig;
/// use std::time::Duration;
///
/// let config = RoomSyncConfig::new("player-7")
///     .with_reconnect_delay(Duration::from_secs(5))
///     .with_chat_history_limit(50);
/// assert_eq!(config.viewer_id, "player-7");
/// assert_eq!(config.event_channel_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct RoomSyncConfig {
    /// Id of the local user.
    pub viewer_id: ParticipantId,
    /// Fixed delay between a connection loss and the next attempt.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, non-terminal events are dropped
    /// (with a warning logged) to avoid blocking the session loop.
    /// `RoomDeleted` and `Closed` are always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the session loop
    /// immediately.
    pub shutdown_timeout: Duration,
    /// Interval between countdown progress updates.
    ///
    /// Defaults to **16 ms**.
    pub frame_interval: Duration,
    /// Number of chat lines kept in session state. Defaults to **200**.
    pub chat_history_limit: usize,
    /// Round intro reading-speed policy.
    pub intro_timing: IntroTiming,
    /// Snapshot fetched before connecting, shown until the first `room_updated`.
    pub initial_snapshot: Option<RoomSnapshot>,
}

impl RoomSyncConfig {
    pub fn new(viewer_id: impl Into<ParticipantId>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
            intro_timing: IntroTiming::default(),
            initial_snapshot: None,
        }
    }

    /// Set the delay before each reconnect attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the countdown frame interval.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set how many chat lines are kept.
    #[must_use]
    pub fn with_chat_history_limit(mut self, limit: usize) -> Self {
        self.chat_history_limit = limit;
        self
    }

    /// Set the round intro timing policy.
    #[must_use]
    pub fn with_intro_timing(mut self, timing: IntroTiming) -> Self {
        self.intro_timing = timing;
        self
    }

    /// Seed the view with a snapshot obtained out of band.
    #[must_use]
    pub fn with_initial_snapshot(mut self, snapshot: RoomSnapshot) -> Self {
        self.initial_snapshot = Some(snapshot);
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Session state published by the session loop after every change.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub snapshot: Option<Arc<RoomSnapshot>>,
    pub overlay: Option<Overlay>,
    pub connected: bool,
    /// Generation of the current (or last) connection; 0 before the first.
    pub generation: u64,
    /// Recent chat lines, oldest first.
    pub chat: Vec<ChatMessage>,
    /// Set once the session task has exited.
    pub ended: bool,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one room view.
///
/// Created via [`RoomClient::start`], which spawns the background session
/// loop and returns this handle together with an event receiver.
///
/// Command methods check the local permission guard against the latest
/// snapshot and return [`SyncError::NotPermitted`] without sending anything
/// when it fails. Otherwise the command is queued and `Ok(())` is returned;
/// delivery is best-effort and commands issued while disconnected are dropped.
pub struct RoomClient {
    viewer_id: ParticipantId,
    frame_interval: Duration,
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    /// Latest state published by the session loop.
    state: watch::Receiver<SessionState>,
    /// Handle to the background session task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl RoomClient {
    /// Start the session loop and return a handle plus event receiver.
    ///
    /// The loop asks `connector` for a transport immediately and again after
    /// every connection loss. Must be called inside a tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C: Connector>(
        connector: C,
        config: RoomSyncConfig,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientCommand>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<RoomEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let store = match config.initial_snapshot {
            Some(snapshot) => RoomStateStore::with_initial(snapshot),
            None => RoomStateStore::new(),
        };
        let dispatcher = EventDispatcher::new(
            store,
            OverlayQueue::new(config.intro_timing),
            config.chat_history_limit,
        );
        let (state_tx, state_rx) = watch::channel(SessionState {
            snapshot: dispatcher.snapshot().cloned(),
            ..SessionState::default()
        });

        let session = Session {
            connector,
            cmd_rx,
            event_tx,
            state_tx,
            dispatcher,
            shutdown_rx,
            reconnect_delay: config.reconnect_delay,
            generation: 0,
        };
        let task = tokio::spawn(session.run());

        let client = Self {
            viewer_id: config.viewer_id,
            frame_interval: config.frame_interval,
            cmd_tx,
            state: state_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Pick the board cell `index` of `category`.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host or the
    /// current player, the room is selecting a question and the cell is unplayed.
    pub fn select_question(&self, category: impl Into<String>, index: u32) -> Result<()> {
        self.emit(ClientCommand::SelectQuestion {
            category: category.into(),
            index,
        })
    }

    /// Pass a cat-in-bag question to `player_id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host or the
    /// current player and `player_id` is a connected player other than the
    /// current one.
    pub fn pass_question(&self, player_id: impl Into<ParticipantId>) -> Result<()> {
        self.emit(ClientCommand::PassQuestion {
            pass_to: player_id.into(),
        })
    }

    /// Place an auction bet.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless betting is open, the viewer has a
    /// positive score and no bet yet, and `amount` is within `0..=score`.
    pub fn place_bet(&self, amount: i64) -> Result<()> {
        self.emit(ClientCommand::PlaceBet { amount })
    }

    /// Judge the answering player's answer.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host and a player is answering.
    pub fn validate_answer(&self, is_correct: bool) -> Result<()> {
        self.emit(ClientCommand::ValidateAnswer { is_correct })
    }

    /// Strike a category from the final round.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host or the
    /// current player and `category` is still available.
    pub fn remove_final_round_category(&self, category: impl Into<String>) -> Result<()> {
        self.emit(ClientCommand::RemoveFinalRoundCategory {
            category: category.into(),
        })
    }

    /// Place the final-round bet.
    ///
    /// # Errors
    ///
    /// Same rules as [`place_bet`](Self::place_bet), in the final-round betting phase.
    pub fn place_final_round_bet(&self, amount: i64) -> Result<()> {
        self.emit(ClientCommand::PlaceFinalRoundBet { amount })
    }

    /// Submit the final-round answer.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is allowed to answer.
    pub fn submit_final_round_answer(&self, answer: impl Into<String>) -> Result<()> {
        self.emit(ClientCommand::SubmitFinalRoundAnswer {
            answer: answer.into(),
        })
    }

    /// Judge the current player's final-round answer.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host and answers are being validated.
    pub fn validate_final_round_answer(&self, is_correct: bool) -> Result<()> {
        self.emit(ClientCommand::ValidateFinalRoundAnswer { is_correct })
    }

    /// Buzz in.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is a player and a
    /// question is being revealed or shown.
    pub fn submit_answer(&self) -> Result<()> {
        self.emit(ClientCommand::SubmitAnswer)
    }

    /// Start the game.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host and the game has not started.
    pub fn start_game(&self) -> Result<()> {
        self.emit(ClientCommand::StartGame)
    }

    /// Pause or resume the game.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotPermitted`] unless the viewer is the host.
    pub fn toggle_pause(&self) -> Result<()> {
        self.emit(ClientCommand::TogglePause)
    }

    /// Send a chat line. Always permitted.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for symmetry with the other commands.
    pub fn chat(&self, text: impl Into<String>) -> Result<()> {
        self.emit(ClientCommand::Chat { text: text.into() })
    }

    /// Shut down the session, closing the transport and stopping the background task.
    ///
    /// The event receiver yields [`RoomEvent::Closed`] and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("RoomClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Abort the loop if it does not exit in time so it cannot detach.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// Returns `true` while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    /// Generation of the current connection; 0 before the first one opens.
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// The latest snapshot, if any has arrived.
    pub fn snapshot(&self) -> Option<Arc<RoomSnapshot>> {
        self.state.borrow().snapshot.clone()
    }

    /// The overlay currently on screen.
    pub fn overlay(&self) -> Option<Overlay> {
        self.state.borrow().overlay.clone()
    }

    /// Recent chat lines, oldest first.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.state.borrow().chat.clone()
    }

    /// Resolve the room view for the local viewer.
    pub fn view(&self) -> Option<PhaseView> {
        let state = self.state.borrow();
        let snapshot = state.snapshot.as_ref()?;
        Some(phase::resolve(
            snapshot,
            &self.viewer_id,
            state.overlay.as_ref(),
            OffsetDateTime::now_utc(),
        ))
    }

    /// Start a countdown for the question panel currently shown, if it has one.
    ///
    /// Must be called inside a tokio runtime. Drop the returned value when the
    /// panel unmounts.
    pub fn countdown(&self) -> Option<Countdown> {
        match self.view()?.top {
            TopPanel::Question {
                countdown: Some(seed),
                ..
            } => Some(Countdown::spawn(seed, self.frame_interval)),
            _ => None,
        }
    }

    /// A receiver notified whenever session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn emit(&self, command: ClientCommand) -> Result<()> {
        let permitted = match &command {
            ClientCommand::Chat { .. } => true,
            _ => self
                .state
                .borrow()
                .snapshot
                .as_ref()
                .is_some_and(|s| phase::permissions(s, &self.viewer_id).allows(&command)),
        };
        if !permitted {
            debug!(command = command.name(), "command suppressed by local guard");
            return Err(SyncError::NotPermitted {
                action: command.name(),
            });
        }
        if let Err(mpsc::error::SendError(command)) = self.cmd_tx.send(command) {
            debug!(command = command.name(), "session ended, dropping command");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("viewer_id", &self.viewer_id)
            .field("connected", &self.is_connected())
            .field("generation", &self.generation())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        // No executor context for a graceful close here; aborting drops the
        // transport and every pending deadline with the loop future.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Why a single connection ended.
enum ConnectionEnd {
    Lost(Option<String>),
    RoomDeleted(RoomEvent),
    Shutdown,
}

/// State owned by the background task.
struct Session<C: Connector> {
    connector: C,
    cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    event_tx: mpsc::Sender<RoomEvent>,
    state_tx: watch::Sender<SessionState>,
    dispatcher: EventDispatcher,
    shutdown_rx: oneshot::Receiver<()>,
    reconnect_delay: Duration,
    generation: u64,
}

impl<C: Connector> Session<C> {
    /// Connect, serve, wait, reconnect, until shutdown or room deletion.
    async fn run(mut self) {
        debug!("session loop started");

        loop {
            let Some(connected) = self.connect().await else {
                self.finish(RoomEvent::Closed).await;
                break;
            };

            let reason = match connected {
                Ok(mut transport) => {
                    self.generation += 1;
                    let generation = self.generation;
                    info!(generation, "room connection established");
                    self.state_tx.send_modify(|s| {
                        s.connected = true;
                        s.generation = generation;
                    });
                    emit_event(&self.event_tx, RoomEvent::Connected { generation });

                    let end = self.serve(&mut transport).await;
                    self.state_tx.send_modify(|s| s.connected = false);
                    match end {
                        ConnectionEnd::Lost(reason) => reason,
                        ConnectionEnd::RoomDeleted(event) => {
                            let _ = transport.close().await;
                            self.finish(event).await;
                            break;
                        }
                        ConnectionEnd::Shutdown => {
                            let _ = transport.close().await;
                            self.finish(RoomEvent::Closed).await;
                            break;
                        }
                    }
                    // The transport is dropped here, before any new connection.
                }
                Err(e) => {
                    warn!("room connection failed: {e}");
                    Some(e.to_string())
                }
            };

            warn!(
                generation = self.generation,
                retry_in = ?self.reconnect_delay,
                "room connection lost, reconnecting"
            );
            emit_event(
                &self.event_tx,
                RoomEvent::Disconnected {
                    reason,
                    retry_in: self.reconnect_delay,
                },
            );

            if !self.wait_before_retry().await {
                self.finish(RoomEvent::Closed).await;
                break;
            }
        }

        debug!("session loop exited");
    }

    /// Ask the connector for a transport. Commands issued meanwhile are
    /// dropped; overlays keep expiring. Returns `None` if the session should end.
    async fn connect(&mut self) -> Option<Result<C::Transport>> {
        let Self {
            connector,
            cmd_rx,
            event_tx,
            state_tx,
            dispatcher,
            shutdown_rx,
            ..
        } = self;
        let mut connecting = connector.connect();

        loop {
            let deadline = dispatcher.next_overlay_deadline();
            tokio::select! {
                result = &mut connecting => return Some(result),
                _ = &mut *shutdown_rx => return None,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => debug!(command = cmd.name(), "not connected, dropping command"),
                    None => return None,
                },
                () = overlay_deadline(deadline) => expire_overlays(dispatcher, state_tx, event_tx),
            }
        }
    }

    /// Multiplex one live connection with commands, overlay deadlines and shutdown.
    async fn serve(&mut self, transport: &mut C::Transport) -> ConnectionEnd {
        loop {
            let deadline = self.dispatcher.next_overlay_deadline();
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("command channel closed, ending session");
                        return ConnectionEnd::Shutdown;
                    };
                    debug!(command = cmd.name(), "sending command");
                    match serde_json::to_string(&cmd) {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("transport send error: {e}");
                                return ConnectionEnd::Lost(Some(e.to_string()));
                            }
                        }
                        Err(e) => error!("failed to serialize command: {e}"),
                    }
                }

                _ = &mut self.shutdown_rx => {
                    debug!("shutdown signal received");
                    return ConnectionEnd::Shutdown;
                }

                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => {
                            if let Some(event) = self.dispatcher.dispatch_text(&text, Instant::now()) {
                                self.publish();
                                if matches!(event, RoomEvent::RoomDeleted { .. }) {
                                    return ConnectionEnd::RoomDeleted(event);
                                }
                                emit_event(&self.event_tx, event);
                            }
                        }
                        Some(Err(e)) => {
                            error!("transport receive error: {e}");
                            return ConnectionEnd::Lost(Some(e.to_string()));
                        }
                        None => {
                            debug!("transport closed by server");
                            return ConnectionEnd::Lost(None);
                        }
                    }
                }

                () = overlay_deadline(deadline) => self.expire_overlays(),
            }
        }
    }

    /// Sleep out the reconnect delay. Commands issued meanwhile are dropped;
    /// overlays keep expiring. Returns `false` if the session should end.
    async fn wait_before_retry(&mut self) -> bool {
        let retry = tokio::time::sleep(self.reconnect_delay);
        tokio::pin!(retry);

        loop {
            let deadline = self.dispatcher.next_overlay_deadline();
            tokio::select! {
                () = &mut retry => return true,
                _ = &mut self.shutdown_rx => return false,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => debug!(command = cmd.name(), "not connected, dropping command"),
                    None => return false,
                },
                () = overlay_deadline(deadline) => self.expire_overlays(),
            }
        }
    }

    fn expire_overlays(&mut self) {
        expire_overlays(&mut self.dispatcher, &self.state_tx, &self.event_tx);
    }

    fn publish(&self) {
        publish(&self.dispatcher, &self.state_tx);
    }

    /// Publish the end of the session and deliver the terminal event.
    async fn finish(&mut self, event: RoomEvent) {
        self.state_tx.send_modify(|s| {
            s.connected = false;
            s.overlay = None;
            s.ended = true;
        });
        emit_terminal(&self.event_tx, event).await;
    }
}

/// Fire due overlay transitions and report the change, if any.
fn expire_overlays(
    dispatcher: &mut EventDispatcher,
    state_tx: &watch::Sender<SessionState>,
    event_tx: &mpsc::Sender<RoomEvent>,
) {
    if let Some(event) = dispatcher.expire_overlays(Instant::now()) {
        publish(dispatcher, state_tx);
        emit_event(event_tx, event);
    }
}

/// Mirror dispatcher state into the watch channel.
fn publish(dispatcher: &EventDispatcher, state_tx: &watch::Sender<SessionState>) {
    let snapshot = dispatcher.snapshot().cloned();
    let overlay = dispatcher.overlays().active().cloned();
    let chat: Vec<ChatMessage> = dispatcher.chat().cloned().collect();
    state_tx.send_modify(|s| {
        s.snapshot = snapshot;
        s.overlay = overlay;
        s.chat = chat;
    });
}

async fn overlay_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the session loop.
fn emit_event(event_tx: &mpsc::Sender<RoomEvent>, event: RoomEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a terminal event with a blocking send: it is always the last event
/// on the channel and must never be dropped.
async fn emit_terminal(event_tx: &mpsc::Sender<RoomEvent>, event: RoomEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays scripted frames and records sent ones.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, SyncError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SyncError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SyncError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Script exhausted: stay open until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SyncError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect call.
    struct MockConnector {
        scripts: VecDeque<Vec<Option<std::result::Result<String, SyncError>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new(
            scripts: Vec<Vec<Option<std::result::Result<String, SyncError>>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicUsize>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let attempts = Arc::new(AtomicUsize::new(0));
            let connector = Self {
                scripts: VecDeque::from(scripts),
                sent: Arc::clone(&sent),
                closed: Arc::new(AtomicBool::new(false)),
                attempts: Arc::clone(&attempts),
            };
            (connector, sent, attempts)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, SyncError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.pop_front().unwrap_or_default();
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn room_json(state: &str, current: Option<&str>) -> String {
        json!({
            "event": "room_updated",
            "payload": {
                "id": "room-1",
                "name": "Friday quiz",
                "packPreview": {"id": "pack-1", "name": "General"},
                "host": {"id": "host", "name": "Host", "avatar": null, "isConnected": true},
                "players": [
                    {"id": "p1", "name": "Ann", "avatar": null, "score": 0, "betAmount": null, "isConnected": true},
                    {"id": "p2", "name": "Bob", "avatar": null, "score": 0, "betAmount": null, "isConnected": true}
                ],
                "state": state,
                "currentRoundName": null,
                "currentRoundQuestions": null,
                "currentPlayer": current,
                "currentQuestion": null,
                "answeringPlayer": null,
                "allowedToAnswer": [],
                "finalRoundState": null,
                "pausedState": {"paused": false, "pausedAt": null}
            }
        })
        .to_string()
    }

    async fn next_event(events: &mut mpsc::Receiver<RoomEvent>) -> RoomEvent {
        events.recv().await.expect("event channel closed")
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn config_defaults() {
        let config = RoomSyncConfig::new("p1");
        assert_eq!(config.viewer_id, "p1");
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.frame_interval, Duration::from_millis(16));
        assert_eq!(config.chat_history_limit, 200);
        assert!(config.initial_snapshot.is_none());
    }

    #[test]
    fn config_clamps_event_channel_capacity() {
        let config = RoomSyncConfig::new("p1").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn first_connection_has_generation_one() {
        let (connector, _sent, attempts) = MockConnector::new(vec![vec![]]);
        let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

        assert_eq!(
            next_event(&mut events).await,
            RoomEvent::Connected { generation: 1 }
        );
        assert!(client.is_connected());
        assert_eq!(client.generation(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        client.shutdown().await;
        assert_eq!(next_event(&mut events).await, RoomEvent::Closed);
        assert!(events.recv().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn snapshot_is_published_before_event() {
        let (connector, _sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(room_json("selecting_question", Some("p1"))))]]);
        let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

        let _ = next_event(&mut events).await; // Connected
        match next_event(&mut events).await {
            RoomEvent::RoomUpdated { snapshot } => {
                assert_eq!(client.snapshot().unwrap(), snapshot);
            }
            other => panic!("expected RoomUpdated, got {other:?}"),
        }
        assert!(client.view().unwrap().permissions.can_select_question);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn permitted_command_is_sent_as_frame() {
        let (connector, sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(room_json("selecting_question", Some("p1"))))]]);
        let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("host"));

        let _ = next_event(&mut events).await; // Connected
        let _ = next_event(&mut events).await; // RoomUpdated

        client.toggle_pause().unwrap();
        client.chat("hello").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let frames = sent.lock().unwrap();
            assert_eq!(frames.len(), 2);
            let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
            assert_eq!(first, json!({"event": "toggle_pause"}));
            let second: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
            assert_eq!(second, json!({"event": "chat", "payload": {"text": "hello"}}));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn forbidden_command_is_suppressed() {
        let (connector, sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(room_json("waiting_for_start", None)))]]);
        let (mut client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p2"));

        let _ = next_event(&mut events).await; // Connected
        let _ = next_event(&mut events).await; // RoomUpdated

        let err = client.start_game().unwrap_err();
        assert!(matches!(
            err,
            SyncError::NotPermitted {
                action: "start_game"
            }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn commands_without_snapshot_are_not_permitted() {
        let (connector, _sent, _attempts) = MockConnector::new(vec![vec![]]);
        let (mut client, _events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));
        assert!(client.submit_answer().is_err());
        assert!(client.chat("anyone here?").is_ok());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn room_deleted_is_terminal() {
        let (connector, _sent, attempts) = MockConnector::new(vec![vec![Some(Ok(
            r#"{"event":"room_deleted","payload":{"id":"room-1"}}"#.to_string(),
        ))]]);
        let (client, mut events) = RoomClient::start(connector, RoomSyncConfig::new("p1"));

        let _ = next_event(&mut events).await; // Connected
        assert_eq!(
            next_event(&mut events).await,
            RoomEvent::RoomDeleted {
                room_id: "room-1".into()
            }
        );
        assert!(events.recv().await.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(client.subscribe().borrow().ended);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_reconnects_after_delay() {
        let (connector, _sent, attempts) = MockConnector::new(vec![vec![None], vec![]]);
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

        assert_eq!(
            next_event(&mut events).await,
            RoomEvent::Connected { generation: 2 }
        );
        assert!(Instant::now() - lost_at >= Duration::from_secs(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_reconnect_wait() {
        let (connector, _sent, attempts) = MockConnector::new(vec![vec![None]]);
        let (mut client, mut events) = RoomClient::start(
            connector,
            RoomSyncConfig::new("p1").with_reconnect_delay(Duration::from_secs(60)),
        );

        let _ = next_event(&mut events).await; // Connected
        let _ = next_event(&mut events).await; // Disconnected

        client.shutdown().await;
        assert_eq!(next_event(&mut events).await, RoomEvent::Closed);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
