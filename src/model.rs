//! Room data model as pushed by the game server.
//!
//! Every type here mirrors the server's JSON projection of a room. Key
//! adaptations:
//!
//! - timestamp fields (`timerStartsAt`, `timerEndsAt`, `pausedAt`) decode into
//!   [`OffsetDateTime`] via RFC 3339
//! - the room phase is a closed enum with an [`Unrecognized`](RoomPhase::Unrecognized)
//!   fallback so newer servers never break decoding
//! - question and final-round data are `Visible`/`Hidden` unions; the server
//!   picks the shape according to the viewer's authorization

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

// ── Type aliases ────────────────────────────────────────────────────

/// Identifier of a user (host or player). The empty string marks the system.
pub type ParticipantId = String;

/// Identifier of a room.
pub type RoomId = String;

/// Decode `null` as the type's default. The server encodes empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Participants ────────────────────────────────────────────────────

/// Identity of a user as shown in rooms and chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Participant {
    /// Returns `true` for the synthetic system author (`id == ""`).
    pub fn is_system(&self) -> bool {
        self.id.is_empty()
    }
}

/// The room host. Hosts moderate the game and never score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    #[serde(flatten)]
    pub participant: Participant,
    pub is_connected: bool,
}

/// A scoring participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(flatten)]
    pub participant: Participant,
    pub score: i64,
    pub bet_amount: Option<i64>,
    pub is_connected: bool,
}

impl Player {
    pub fn id(&self) -> &str {
        &self.participant.id
    }

    /// Whether this player still owes a bet: positive score and no bet recorded.
    pub fn can_bet(&self) -> bool {
        self.score > 0 && self.bet_amount.is_none()
    }
}

/// Identity of the question pack the room plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackPreview {
    pub id: String,
    pub name: String,
}

// ── Phase ───────────────────────────────────────────────────────────

/// Server-driven stage of the game. The client never transitions it itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoomPhase {
    WaitingForStart,
    SelectingQuestion,
    RevealingQuestion,
    ShowingQuestion,
    Answering,
    Betting,
    Passing,
    SelectingFinalRoundCategory,
    FinalRoundBetting,
    ShowingFinalRoundQuestion,
    ValidatingFinalRoundAnswers,
    GameOver,
    /// A phase this client does not know yet.
    Unrecognized(String),
}

impl RoomPhase {
    /// Wire name of the phase.
    pub fn as_str(&self) -> &str {
        match self {
            Self::WaitingForStart => "waiting_for_start",
            Self::SelectingQuestion => "selecting_question",
            Self::RevealingQuestion => "revealing_question",
            Self::ShowingQuestion => "showing_question",
            Self::Answering => "answering",
            Self::Betting => "betting",
            Self::Passing => "passing",
            Self::SelectingFinalRoundCategory => "selecting_final_round_category",
            Self::FinalRoundBetting => "final_round_betting",
            Self::ShowingFinalRoundQuestion => "showing_final_round_question",
            Self::ValidatingFinalRoundAnswers => "validating_final_round_answers",
            Self::GameOver => "game_over",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for RoomPhase {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "waiting_for_start" => Self::WaitingForStart,
            "selecting_question" => Self::SelectingQuestion,
            "revealing_question" => Self::RevealingQuestion,
            "showing_question" => Self::ShowingQuestion,
            "answering" => Self::Answering,
            "betting" => Self::Betting,
            "passing" => Self::Passing,
            "selecting_final_round_category" => Self::SelectingFinalRoundCategory,
            "final_round_betting" => Self::FinalRoundBetting,
            "showing_final_round_question" => Self::ShowingFinalRoundQuestion,
            "validating_final_round_answers" => Self::ValidatingFinalRoundAnswers,
            "game_over" => Self::GameOver,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<RoomPhase> for String {
    fn from(phase: RoomPhase) -> Self {
        match phase {
            RoomPhase::Unrecognized(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Board & questions ───────────────────────────────────────────────

/// One cell of the round board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCell {
    pub index: u32,
    pub value: i64,
    pub has_been_played: bool,
}

/// Media kind of a question attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

/// Media attached to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub media_type: MediaType,
    pub content_url: String,
    /// Playback length in seconds (0 for images).
    #[serde(default)]
    pub duration: u32,
}

/// How a question is played once selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    Regular,
    CatInBag,
    Auction,
}

/// The active question with its answer key (host view, or after reveal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleQuestion {
    pub index: u32,
    pub value: i64,
    pub attachment: Option<Attachment>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    pub answers: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub timer_last_progress: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_ends_at: OffsetDateTime,
}

/// The active question with its answer key withheld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenQuestion {
    pub index: u32,
    pub value: i64,
    pub attachment: Option<Attachment>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    pub timer_last_progress: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_ends_at: OffsetDateTime,
}

/// The active question, in whichever shape the server sent for this viewer.
///
/// The visible shape is tried first; it requires the `answers` key, which the
/// hidden projection never carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurrentQuestion {
    Visible(VisibleQuestion),
    Hidden(HiddenQuestion),
}

impl CurrentQuestion {
    pub fn text(&self) -> &str {
        match self {
            Self::Visible(q) => &q.text,
            Self::Hidden(q) => &q.text,
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            Self::Visible(q) => q.value,
            Self::Hidden(q) => q.value,
        }
    }

    pub fn kind(&self) -> QuestionKind {
        match self {
            Self::Visible(q) => q.kind,
            Self::Hidden(q) => q.kind,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Visible(q) => q.attachment.as_ref(),
            Self::Hidden(q) => q.attachment.as_ref(),
        }
    }

    pub fn timer_last_progress(&self) -> f64 {
        match self {
            Self::Visible(q) => q.timer_last_progress,
            Self::Hidden(q) => q.timer_last_progress,
        }
    }

    pub fn timer_ends_at(&self) -> OffsetDateTime {
        match self {
            Self::Visible(q) => q.timer_ends_at,
            Self::Hidden(q) => q.timer_ends_at,
        }
    }

    /// Accepted answers and the optional comment, when this viewer may see them.
    pub fn answer_key(&self) -> Option<(&[String], Option<&str>)> {
        match self {
            Self::Visible(q) => Some((&q.answers, q.comment.as_deref())),
            Self::Hidden(_) => None,
        }
    }
}

/// Player currently holding the answer, with their thinking window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweringPlayer {
    pub id: ParticipantId,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub timer_ends_at: OffsetDateTime,
}

// ── Final round ─────────────────────────────────────────────────────

/// Final-round question with its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRoundQuestion {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub answers: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Final-round question with its answer key withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenFinalRoundQuestion {
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Final-round state including every player's submitted answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleFinalRoundState {
    pub available_categories: Option<BTreeMap<String, bool>>,
    pub question: Option<FinalRoundQuestion>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<ParticipantId>,
    pub players_answers: Option<BTreeMap<ParticipantId, String>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

/// Final-round state where answers are reduced to "has answered" flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenFinalRoundState {
    pub available_categories: Option<BTreeMap<String, bool>>,
    pub question: Option<HiddenFinalRoundQuestion>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<ParticipantId>,
    pub players_answers: Option<BTreeMap<ParticipantId, bool>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

/// Final-round state in whichever shape the server sent for this viewer.
///
/// When neither a question nor any answers are present both shapes are
/// identical and the payload decodes as `Visible`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalRoundState {
    Visible(VisibleFinalRoundState),
    Hidden(HiddenFinalRoundState),
}

impl FinalRoundState {
    /// Categories still in play, in board order.
    pub fn available_categories(&self) -> Vec<String> {
        let map = match self {
            Self::Visible(s) => s.available_categories.as_ref(),
            Self::Hidden(s) => s.available_categories.as_ref(),
        };
        map.map(|m| {
            m.iter()
                .filter(|(_, available)| **available)
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn question_text(&self) -> Option<&str> {
        match self {
            Self::Visible(s) => s.question.as_ref().map(|q| q.text.as_str()),
            Self::Hidden(s) => s.question.as_ref().map(|q| q.text.as_str()),
        }
    }

    /// Accepted answers and comment of the final question, when visible.
    pub fn answer_key(&self) -> Option<(&[String], Option<&str>)> {
        match self {
            Self::Visible(s) => s
                .question
                .as_ref()
                .map(|q| (q.answers.as_slice(), q.comment.as_deref())),
            Self::Hidden(_) => None,
        }
    }

    /// Submitted answer text of `player_id`, when visible.
    pub fn answer_of(&self, player_id: &str) -> Option<&str> {
        match self {
            Self::Visible(s) => s
                .players_answers
                .as_ref()
                .and_then(|answers| answers.get(player_id))
                .map(String::as_str),
            Self::Hidden(_) => None,
        }
    }

    pub fn timer_ends_at(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Visible(s) => s.timer_ends_at,
            Self::Hidden(s) => s.timer_ends_at,
        }
    }
}

/// Pause flag set by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedState {
    pub paused: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub paused_at: Option<OffsetDateTime>,
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Complete authoritative room state as of one server push.
///
/// Snapshots are never patched; each `room_updated` frame replaces the
/// previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub name: String,
    pub pack_preview: PackPreview,
    pub host: Option<Host>,
    #[serde(deserialize_with = "null_as_default")]
    pub players: Vec<Player>,
    pub state: RoomPhase,
    pub current_round_name: Option<String>,
    pub current_round_questions: Option<BTreeMap<String, Vec<QuestionCell>>>,
    pub current_player: Option<ParticipantId>,
    pub current_question: Option<CurrentQuestion>,
    pub answering_player: Option<AnsweringPlayer>,
    #[serde(deserialize_with = "null_as_default")]
    pub allowed_to_answer: Vec<ParticipantId>,
    pub final_round_state: Option<FinalRoundState>,
    pub paused_state: PausedState,
}

impl RoomSnapshot {
    pub fn is_host(&self, viewer: &str) -> bool {
        self.host
            .as_ref()
            .is_some_and(|host| host.participant.id == viewer)
    }

    pub fn is_current_player(&self, viewer: &str) -> bool {
        self.current_player.as_deref() == Some(viewer)
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_state.paused
    }
}

// ── Chat & overlays ─────────────────────────────────────────────────

/// One chat line. Messages from the system author carry an empty id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: Participant,
    pub text: String,
}

impl ChatMessage {
    /// Returns `true` for system messages, rendered without authorship.
    pub fn is_system(&self) -> bool {
        self.from.is_system()
    }
}

/// Announcement of a new round and its categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundIntro {
    #[serde(rename = "name")]
    pub round_name: String,
    #[serde(rename = "categories")]
    pub category_names: Vec<String>,
}

impl RoundIntro {
    /// The scrolling line shown under the round name.
    pub fn category_line(&self) -> String {
        self.category_names.join(", ")
    }
}

/// Correct-answer reveal shown for a fixed number of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerReveal {
    pub answers: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(rename = "duration", default = "default_reveal_seconds")]
    pub duration_seconds: u64,
}

fn default_reveal_seconds() -> u64 {
    5
}

impl AnswerReveal {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    /// Answers joined for display.
    pub fn answer_line(&self) -> String {
        self.answers.join(", ")
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

    fn hidden_question_json() -> serde_json::Value {
        json!({
            "index": 2,
            "value": 300,
            "attachment": null,
            "type": "regular",
            "text": "Capital of Peru?",
            "timerLastProgress": 0.5,
            "timerStartsAt": "2026-01-01T12:00:00Z",
            "timerEndsAt": "2026-01-01T12:00:10.250Z"
        })
    }

    #[test]
    fn phase_decodes_known_and_unknown_values() {
        let phase: RoomPhase = serde_json::from_value(json!("final_round_betting")).unwrap();
        assert_eq!(phase, RoomPhase::FinalRoundBetting);

        let phase: RoomPhase = serde_json::from_value(json!("sudden_death")).unwrap();
        assert_eq!(phase, RoomPhase::Unrecognized("sudden_death".into()));
        assert_eq!(phase.to_string(), "sudden_death");
    }

    #[test]
    fn phase_encodes_as_wire_string() {
        let value = serde_json::to_value(RoomPhase::SelectingFinalRoundCategory).unwrap();
        assert_eq!(value, json!("selecting_final_round_category"));
    }

    #[test]
    fn hidden_question_decodes_as_hidden() {
        let q: CurrentQuestion = serde_json::from_value(hidden_question_json()).unwrap();
        assert!(matches!(q, CurrentQuestion::Hidden(_)));
        assert_eq!(q.text(), "Capital of Peru?");
        assert!(q.answer_key().is_none());
        assert_eq!(q.timer_ends_at().millisecond(), 250);
    }

    #[test]
    fn visible_question_exposes_answer_key() {
        let mut raw = hidden_question_json();
        raw["answers"] = json!(["Lima"]);
        raw["comment"] = json!("on the coast");
        raw["type"] = json!("catInBag");

        let q: CurrentQuestion = serde_json::from_value(raw).unwrap();
        assert!(matches!(q, CurrentQuestion::Visible(_)));
        assert_eq!(q.kind(), QuestionKind::CatInBag);
        let (answers, comment) = q.answer_key().unwrap();
        assert_eq!(answers, ["Lima".to_string()]);
        assert_eq!(comment, Some("on the coast"));
    }

    #[test]
    fn final_round_state_shape_follows_answer_values() {
        let hidden: FinalRoundState = serde_json::from_value(json!({
            "availableCategories": {"Art": true, "Film": false},
            "question": {"text": "Who painted it?", "attachment": null},
            "players": ["p1", "p2"],
            "playersAnswers": {"p1": true},
            "timerEndsAt": "2026-01-01T12:01:00Z"
        }))
        .unwrap();
        assert!(matches!(hidden, FinalRoundState::Hidden(_)));
        assert_eq!(hidden.available_categories(), vec!["Art".to_string()]);
        assert!(hidden.answer_of("p1").is_none());

        let visible: FinalRoundState = serde_json::from_value(json!({
            "availableCategories": null,
            "question": {"text": "Who painted it?", "attachment": null, "answers": ["Goya"]},
            "players": ["p1"],
            "playersAnswers": {"p1": "Goya"},
            "timerEndsAt": null
        }))
        .unwrap();
        assert!(matches!(visible, FinalRoundState::Visible(_)));
        assert_eq!(visible.answer_of("p1"), Some("Goya"));
        assert!(visible.available_categories().is_empty());
    }

    #[test]
    fn player_flattens_participant_fields() {
        let player: Player = serde_json::from_value(json!({
            "id": "p1",
            "name": "Ann",
            "avatar": null,
            "score": 400,
            "betAmount": null,
            "isConnected": true
        }))
        .unwrap();
        assert_eq!(player.id(), "p1");
        assert!(player.can_bet());
    }

    #[test]
    fn player_with_zero_score_cannot_bet() {
        let player = Player {
            participant: Participant {
                id: "p1".into(),
                name: "Ann".into(),
                avatar: None,
            },
            score: 0,
            bet_amount: None,
            is_connected: true,
        };
        assert!(!player.can_bet());
    }

    #[test]
    fn system_chat_message_has_empty_author_id() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "from": {"id": "", "name": "", "avatar": null},
            "text": "Ann joined"
        }))
        .unwrap();
        assert!(msg.is_system());
    }

    #[test]
    fn overlay_payloads_use_wire_names() {
        let intro: RoundIntro =
            serde_json::from_value(json!({"name": "Round 1", "categories": ["A", "B"]})).unwrap();
        assert_eq!(intro.category_line(), "A, B");

        let reveal: AnswerReveal = serde_json::from_value(
            json!({"answers": ["Lima", "Lima, Peru"], "comment": null, "duration": 5}),
        )
        .unwrap();
        assert_eq!(reveal.duration(), Duration::from_secs(5));
        assert_eq!(reveal.answer_line(), "Lima, Lima, Peru");
    }
}
