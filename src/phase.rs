//! Phase resolution: what to show and what the viewer may do.
//!
//! [`resolve`] is a pure function of the current snapshot, the viewer's id,
//! the active overlay and the wall clock (used only to seed countdowns). It
//! never mutates anything and can be recomputed after every change.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::model::{Attachment, ParticipantId, QuestionCell, RoomPhase, RoomSnapshot, RoundIntro};
use crate::overlay::Overlay;
use crate::protocol::ClientCommand;
use crate::timer::CountdownSeed;

/// Main panel of the room view.
#[derive(Debug, Clone, PartialEq)]
pub enum TopPanel {
    /// Plain text, e.g. "Waiting for start".
    Status {
        title: String,
        subtitle: Option<String>,
    },
    /// The round board.
    Board {
        round_name: Option<String>,
        categories: BTreeMap<String, Vec<QuestionCell>>,
    },
    /// A question, with a countdown while one is running.
    Question {
        text: String,
        attachment: Option<Attachment>,
        countdown: Option<CountdownSeed>,
    },
    /// Final-round categories still in play.
    FinalRoundCategories { categories: Vec<String> },
    /// Round intro overlay.
    RoundIntro(RoundIntro),
    /// Correct-answer reveal overlay.
    AnswerReveal {
        answers: String,
        comment: Option<String>,
    },
    /// A phase this client does not know.
    Unrecognized { message: String },
}

/// Action area below the player row. Only players get one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BottomPanel {
    None,
    Buzzer { enabled: bool },
    Betting {
        max: i64,
        enabled: bool,
        final_round: bool,
    },
    FinalAnswer { enabled: bool },
}

/// Host-only correctness validation control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPanel {
    pub question: String,
    /// Accepted answers, when the host's snapshot carries them.
    pub answers: Vec<String>,
    pub comment: Option<String>,
    /// The answer under review; only final-round answers are written.
    pub player_answer: Option<String>,
    pub final_round: bool,
}

/// What the viewer is currently allowed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub can_select_question: bool,
    pub can_buzz: bool,
    pub can_validate_answer: bool,
    pub can_place_bet: bool,
    pub can_place_final_round_bet: bool,
    /// Upper bound of any bet: the viewer's own score.
    pub max_bet: i64,
    pub can_pass_question: bool,
    /// Players the question may be passed to.
    pub pass_targets: Vec<ParticipantId>,
    pub can_remove_final_round_category: bool,
    pub removable_categories: Vec<String>,
    pub can_submit_final_round_answer: bool,
    pub can_validate_final_round_answer: bool,
    pub can_start_game: bool,
    pub can_toggle_pause: bool,
    /// Unplayed board cells, for selection checks.
    open_cells: Vec<(String, u32)>,
}

impl Permissions {
    /// Whether `command` passes the local guard. Chat is always allowed.
    pub fn allows(&self, command: &ClientCommand) -> bool {
        match command {
            ClientCommand::SelectQuestion { category, index } => {
                self.can_select_question
                    && self
                        .open_cells
                        .iter()
                        .any(|(c, i)| c == category && i == index)
            }
            ClientCommand::PassQuestion { pass_to } => {
                self.can_pass_question && self.pass_targets.iter().any(|t| t == pass_to)
            }
            ClientCommand::PlaceBet { amount } => {
                self.can_place_bet && (0..=self.max_bet).contains(amount)
            }
            ClientCommand::PlaceFinalRoundBet { amount } => {
                self.can_place_final_round_bet && (0..=self.max_bet).contains(amount)
            }
            ClientCommand::ValidateAnswer { .. } => self.can_validate_answer,
            ClientCommand::RemoveFinalRoundCategory { category } => {
                self.can_remove_final_round_category
                    && self.removable_categories.iter().any(|c| c == category)
            }
            ClientCommand::SubmitFinalRoundAnswer { .. } => self.can_submit_final_round_answer,
            ClientCommand::ValidateFinalRoundAnswer { .. } => {
                self.can_validate_final_round_answer
            }
            ClientCommand::SubmitAnswer => self.can_buzz,
            ClientCommand::StartGame => self.can_start_game,
            ClientCommand::TogglePause => self.can_toggle_pause,
            ClientCommand::Chat { .. } => true,
        }
    }
}

/// Everything the room view renders for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseView {
    pub phase: RoomPhase,
    pub top: TopPanel,
    pub bottom: BottomPanel,
    pub validation: Option<ValidationPanel>,
    pub permissions: Permissions,
    /// Players drawn with a highlight border.
    pub highlighted: Vec<ParticipantId>,
    /// Bet of the answering player, shown under their score.
    pub answering_bet: Option<i64>,
}

/// Map `(snapshot, viewer, overlay)` to the room view.
///
/// `now` anchors countdown seeds against the server's deadlines.
pub fn resolve(
    snapshot: &RoomSnapshot,
    viewer: &str,
    overlay: Option<&Overlay>,
    now: OffsetDateTime,
) -> PhaseView {
    let permissions = permissions(snapshot, viewer);
    let top = overlay_panel(&snapshot.state, overlay)
        .unwrap_or_else(|| phase_panel(snapshot, now));
    let bottom = bottom_panel(snapshot, viewer, &permissions);

    PhaseView {
        phase: snapshot.state.clone(),
        top,
        bottom,
        validation: validation_panel(snapshot, viewer),
        highlighted: highlighted(snapshot),
        answering_bet: answering_bet(snapshot),
        permissions,
    }
}

/// Permissions alone, without building panels.
pub fn permissions(snapshot: &RoomSnapshot, viewer: &str) -> Permissions {
    let phase = &snapshot.state;
    let is_host = snapshot.is_host(viewer);
    let steers = is_host || snapshot.is_current_player(viewer);
    let player = snapshot.player(viewer);
    let can_bet = player.is_some_and(|p| p.can_bet());

    let can_select_question = *phase == RoomPhase::SelectingQuestion && steers;
    let can_pass_question = *phase == RoomPhase::Passing && steers;
    let can_remove_final_round_category =
        *phase == RoomPhase::SelectingFinalRoundCategory && steers;

    Permissions {
        can_select_question,
        can_buzz: player.is_some()
            && !is_host
            && matches!(
                phase,
                RoomPhase::RevealingQuestion | RoomPhase::ShowingQuestion
            ),
        can_validate_answer: is_host && *phase == RoomPhase::Answering,
        can_place_bet: *phase == RoomPhase::Betting && can_bet,
        can_place_final_round_bet: *phase == RoomPhase::FinalRoundBetting && can_bet,
        max_bet: player.map(|p| p.score.max(0)).unwrap_or_default(),
        can_pass_question,
        pass_targets: if can_pass_question {
            pass_targets(snapshot)
        } else {
            Vec::new()
        },
        can_remove_final_round_category,
        removable_categories: if can_remove_final_round_category {
            snapshot
                .final_round_state
                .as_ref()
                .map(|s| s.available_categories())
                .unwrap_or_default()
        } else {
            Vec::new()
        },
        can_submit_final_round_answer: *phase == RoomPhase::ShowingFinalRoundQuestion
            && snapshot.allowed_to_answer.iter().any(|id| id == viewer),
        can_validate_final_round_answer: is_host
            && *phase == RoomPhase::ValidatingFinalRoundAnswers,
        can_start_game: is_host && *phase == RoomPhase::WaitingForStart,
        can_toggle_pause: is_host,
        open_cells: if can_select_question {
            open_cells(snapshot)
        } else {
            Vec::new()
        },
    }
}

/// Connected players other than the current one.
pub fn pass_targets(snapshot: &RoomSnapshot) -> Vec<ParticipantId> {
    snapshot
        .players
        .iter()
        .filter(|p| p.is_connected && !snapshot.is_current_player(p.id()))
        .map(|p| p.id().to_owned())
        .collect()
}

fn open_cells(snapshot: &RoomSnapshot) -> Vec<(String, u32)> {
    snapshot
        .current_round_questions
        .iter()
        .flatten()
        .flat_map(|(category, cells)| {
            cells
                .iter()
                .filter(|cell| !cell.has_been_played)
                .map(move |cell| (category.clone(), cell.index))
        })
        .collect()
}

fn overlay_panel(phase: &RoomPhase, overlay: Option<&Overlay>) -> Option<TopPanel> {
    match overlay? {
        Overlay::Reveal(reveal) => Some(TopPanel::AnswerReveal {
            answers: reveal.answer_line(),
            comment: reveal.comment.clone(),
        }),
        // The game is over; there is no round left to introduce.
        Overlay::Intro(_) if *phase == RoomPhase::GameOver => None,
        Overlay::Intro(intro) => Some(TopPanel::RoundIntro(intro.clone())),
    }
}

fn status(title: &str, subtitle: Option<&str>) -> TopPanel {
    TopPanel::Status {
        title: title.to_owned(),
        subtitle: subtitle.map(str::to_owned),
    }
}

fn phase_panel(snapshot: &RoomSnapshot, now: OffsetDateTime) -> TopPanel {
    let question = snapshot.current_question.as_ref();
    let question_panel = |countdown: Option<CountdownSeed>| TopPanel::Question {
        text: question.map(|q| q.text().to_owned()).unwrap_or_default(),
        attachment: question.and_then(|q| q.attachment().cloned()),
        countdown,
    };
    let final_question_panel = |countdown: Option<CountdownSeed>| TopPanel::Question {
        text: final_question_text(snapshot),
        attachment: None,
        countdown,
    };

    match &snapshot.state {
        RoomPhase::WaitingForStart => status("Waiting for start", None),
        RoomPhase::SelectingQuestion => TopPanel::Board {
            round_name: snapshot.current_round_name.clone(),
            categories: snapshot.current_round_questions.clone().unwrap_or_default(),
        },
        RoomPhase::RevealingQuestion => question_panel(None),
        RoomPhase::ShowingQuestion | RoomPhase::Answering => {
            question_panel(countdown_seed(snapshot, now))
        }
        RoomPhase::Passing => status("Cat in bag!", Some("Pass the question to another player")),
        RoomPhase::Betting => status("Auction!", Some("Place your bet")),
        RoomPhase::SelectingFinalRoundCategory => TopPanel::FinalRoundCategories {
            categories: snapshot
                .final_round_state
                .as_ref()
                .map(|s| s.available_categories())
                .unwrap_or_default(),
        },
        RoomPhase::FinalRoundBetting => status("Final round!", Some("Place your bet")),
        RoomPhase::ShowingFinalRoundQuestion => {
            final_question_panel(countdown_seed(snapshot, now))
        }
        RoomPhase::ValidatingFinalRoundAnswers => final_question_panel(None),
        RoomPhase::GameOver => status("Game over!", None),
        RoomPhase::Unrecognized(raw) => TopPanel::Unrecognized {
            message: format!("Unexpected room state: {raw}"),
        },
    }
}

fn final_question_text(snapshot: &RoomSnapshot) -> String {
    snapshot
        .final_round_state
        .as_ref()
        .and_then(|s| s.question_text())
        .unwrap_or_default()
        .to_owned()
}

/// Countdown sample for the current phase, if it runs one.
///
/// A paused room freezes its countdowns, so no seed is produced.
pub fn countdown_seed(snapshot: &RoomSnapshot, now: OffsetDateTime) -> Option<CountdownSeed> {
    if snapshot.is_paused() {
        return None;
    }
    match snapshot.state {
        RoomPhase::ShowingQuestion => {
            let q = snapshot.current_question.as_ref()?;
            Some(CountdownSeed::until(
                q.timer_ends_at(),
                q.timer_last_progress(),
                now,
            ))
        }
        RoomPhase::Answering => {
            let answering = snapshot.answering_player.as_ref()?;
            Some(CountdownSeed::until(answering.timer_ends_at, 1.0, now))
        }
        RoomPhase::ShowingFinalRoundQuestion => {
            let ends_at = snapshot.final_round_state.as_ref()?.timer_ends_at()?;
            Some(CountdownSeed::until(ends_at, 1.0, now))
        }
        _ => None,
    }
}

fn bottom_panel(snapshot: &RoomSnapshot, viewer: &str, permissions: &Permissions) -> BottomPanel {
    if snapshot.player(viewer).is_none() {
        return BottomPanel::None;
    }
    match snapshot.state {
        RoomPhase::Betting => BottomPanel::Betting {
            max: permissions.max_bet,
            enabled: permissions.can_place_bet,
            final_round: false,
        },
        RoomPhase::FinalRoundBetting => BottomPanel::Betting {
            max: permissions.max_bet,
            enabled: permissions.can_place_final_round_bet,
            final_round: true,
        },
        RoomPhase::ShowingFinalRoundQuestion => BottomPanel::FinalAnswer {
            enabled: permissions.can_submit_final_round_answer,
        },
        RoomPhase::WaitingForStart
        | RoomPhase::ValidatingFinalRoundAnswers
        | RoomPhase::GameOver => BottomPanel::None,
        _ => BottomPanel::Buzzer {
            enabled: permissions.can_buzz,
        },
    }
}

fn validation_panel(snapshot: &RoomSnapshot, viewer: &str) -> Option<ValidationPanel> {
    if !snapshot.is_host(viewer) {
        return None;
    }
    match snapshot.state {
        RoomPhase::Answering => {
            let question = snapshot.current_question.as_ref()?;
            let (answers, comment) = question.answer_key().unwrap_or_default();
            Some(ValidationPanel {
                question: question.text().to_owned(),
                answers: answers.to_vec(),
                comment: comment.map(str::to_owned),
                player_answer: None,
                final_round: false,
            })
        }
        RoomPhase::ValidatingFinalRoundAnswers => {
            let state = snapshot.final_round_state.as_ref()?;
            let (answers, comment) = state.answer_key().unwrap_or_default();
            Some(ValidationPanel {
                question: state.question_text().unwrap_or_default().to_owned(),
                answers: answers.to_vec(),
                comment: comment.map(str::to_owned),
                player_answer: snapshot
                    .current_player
                    .as_deref()
                    .and_then(|id| state.answer_of(id))
                    .map(str::to_owned),
                final_round: true,
            })
        }
        _ => None,
    }
}

fn highlighted(snapshot: &RoomSnapshot) -> Vec<ParticipantId> {
    let answering = snapshot.answering_player.as_ref().map(|a| a.id.as_str());
    snapshot
        .players
        .iter()
        .filter(|p| match snapshot.state {
            RoomPhase::SelectingQuestion | RoomPhase::ValidatingFinalRoundAnswers => {
                snapshot.is_current_player(p.id())
            }
            RoomPhase::Answering => answering == Some(p.id()),
            RoomPhase::Passing => p.is_connected && !snapshot.is_current_player(p.id()),
            RoomPhase::Betting | RoomPhase::FinalRoundBetting => p.can_bet(),
            _ => false,
        })
        .map(|p| p.id().to_owned())
        .collect()
}

fn answering_bet(snapshot: &RoomSnapshot) -> Option<i64> {
    if snapshot.state != RoomPhase::Answering {
        return None;
    }
    let answering = snapshot.answering_player.as_ref()?;
    snapshot.player(&answering.id)?.bet_amount
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
    use crate::model::{
        AnswerReveal, AnsweringPlayer, CurrentQuestion, FinalRoundState, Host, HiddenQuestion,
        PackPreview, Participant, PausedState, Player, QuestionKind, VisibleFinalRoundState,
    };

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.into(),
            name: id.to_uppercase(),
            avatar: None,
        }
    }

    fn player(id: &str, score: i64, bet: Option<i64>, connected: bool) -> Player {
        Player {
            participant: participant(id),
            score,
            bet_amount: bet,
            is_connected: connected,
        }
    }

    fn room(state: RoomPhase, players: Vec<Player>, current: Option<&str>) -> RoomSnapshot {
        RoomSnapshot {
            id: "room-1".into(),
            name: "Friday quiz".into(),
            pack_preview: PackPreview {
                id: "pack-1".into(),
                name: "General".into(),
            },
            host: Some(Host {
                participant: participant("host"),
                is_connected: true,
            }),
            players,
            state,
            current_round_name: Some("Round 1".into()),
            current_round_questions: None,
            current_player: current.map(Into::into),
            current_question: None,
            answering_player: None,
            allowed_to_answer: vec![],
            final_round_state: None,
            paused_state: PausedState::default(),
        }
    }

    fn question(ends_at: OffsetDateTime, progress: f64) -> CurrentQuestion {
        CurrentQuestion::Hidden(HiddenQuestion {
            index: 0,
            value: 100,
            attachment: None,
            kind: QuestionKind::Regular,
            text: "Capital of France?".into(),
            timer_last_progress: progress,
            timer_starts_at: ends_at - time::Duration::seconds(10),
            timer_ends_at: ends_at,
        })
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn selecting_question_is_allowed_for_current_player_and_host_only() {
        let mut snap = room(
            RoomPhase::SelectingQuestion,
            vec![player("p1", 0, None, true), player("p2", 0, None, true)],
            Some("p1"),
        );
        snap.current_round_questions = Some(BTreeMap::from([(
            "History".to_string(),
            vec![
                QuestionCell {
                    index: 0,
                    value: 100,
                    has_been_played: true,
                },
                QuestionCell {
                    index: 1,
                    value: 200,
                    has_been_played: false,
                },
            ],
        )]));

        assert!(permissions(&snap, "p1").can_select_question);
        assert!(permissions(&snap, "host").can_select_question);
        assert!(!permissions(&snap, "p2").can_select_question);

        let p1 = permissions(&snap, "p1");
        let select = |index| ClientCommand::SelectQuestion {
            category: "History".into(),
            index,
        };
        assert!(p1.allows(&select(1)));
        assert!(!p1.allows(&select(0)), "played cells cannot be selected");

        let view = resolve(&snap, "p1", None, now());
        assert!(matches!(view.top, TopPanel::Board { .. }));
        assert_eq!(view.highlighted, vec!["p1".to_string()]);
    }

    #[test]
    fn zero_score_never_bets() {
        for bet in [None, Some(0), Some(10)] {
            let snap = room(RoomPhase::Betting, vec![player("p1", 0, bet, true)], None);
            let perms = permissions(&snap, "p1");
            assert!(!perms.can_place_bet);
            assert!(!perms.allows(&ClientCommand::PlaceBet { amount: 0 }));
        }
    }

    #[test]
    fn recorded_bet_blocks_rebetting() {
        let snap = room(
            RoomPhase::Betting,
            vec![player("p1", 500, Some(100), true)],
            None,
        );
        assert!(!permissions(&snap, "p1").can_place_bet);

        let snap = room(RoomPhase::Betting, vec![player("p1", 500, None, true)], None);
        let perms = permissions(&snap, "p1");
        assert!(perms.can_place_bet);
        assert!(perms.allows(&ClientCommand::PlaceBet { amount: 500 }));
        assert!(!perms.allows(&ClientCommand::PlaceBet { amount: 501 }));
        assert!(!perms.allows(&ClientCommand::PlaceFinalRoundBet { amount: 10 }));

        let view = resolve(&snap, "p1", None, now());
        assert_eq!(
            view.bottom,
            BottomPanel::Betting {
                max: 500,
                enabled: true,
                final_round: false
            }
        );
    }

    #[test]
    fn pass_targets_exclude_current_and_disconnected_players() {
        let snap = room(
            RoomPhase::Passing,
            vec![
                player("p1", 0, None, true),
                player("p2", 0, None, true),
                player("p3", 0, None, false),
            ],
            Some("p1"),
        );

        let perms = permissions(&snap, "p1");
        assert_eq!(perms.pass_targets, vec!["p2".to_string()]);
        assert!(perms.allows(&ClientCommand::PassQuestion {
            pass_to: "p2".into()
        }));
        assert!(!perms.allows(&ClientCommand::PassQuestion {
            pass_to: "p1".into()
        }));
        assert!(!perms.allows(&ClientCommand::PassQuestion {
            pass_to: "p3".into()
        }));

        assert!(!permissions(&snap, "p2").can_pass_question);
        assert!(permissions(&snap, "host").can_pass_question);
    }

    #[test]
    fn showing_question_seeds_countdown_from_snapshot() {
        let t = now();
        let mut snap = room(
            RoomPhase::ShowingQuestion,
            vec![player("p1", 0, None, true)],
            None,
        );
        snap.current_question = Some(question(t + time::Duration::seconds(4), 0.4));

        let view = resolve(&snap, "p1", None, t);
        match view.top {
            TopPanel::Question {
                text, countdown, ..
            } => {
                assert_eq!(text, "Capital of France?");
                let seed = countdown.unwrap();
                assert_eq!(seed.initial_progress, 0.4);
                assert_eq!(seed.remaining, std::time::Duration::from_secs(4));
            }
            other => panic!("expected question panel, got {other:?}"),
        }
        assert_eq!(view.bottom, BottomPanel::Buzzer { enabled: true });
        assert!(!permissions(&snap, "host").can_buzz);
    }

    #[test]
    fn paused_room_has_no_countdown() {
        let t = now();
        let mut snap = room(RoomPhase::ShowingQuestion, vec![], None);
        snap.current_question = Some(question(t + time::Duration::seconds(4), 0.4));
        snap.paused_state = PausedState {
            paused: true,
            paused_at: Some(t),
        };
        assert!(countdown_seed(&snap, t).is_none());
    }

    #[test]
    fn answering_shows_bet_and_host_validation() {
        let t = now();
        let mut snap = room(
            RoomPhase::Answering,
            vec![player("p1", 300, Some(200), true), player("p2", 0, None, true)],
            Some("p1"),
        );
        snap.current_question = Some(question(t + time::Duration::seconds(10), 1.0));
        snap.answering_player = Some(AnsweringPlayer {
            id: "p1".into(),
            timer_starts_at: t,
            timer_ends_at: t + time::Duration::seconds(8),
        });

        let host_view = resolve(&snap, "host", None, t);
        assert_eq!(host_view.answering_bet, Some(200));
        assert_eq!(host_view.highlighted, vec!["p1".to_string()]);
        assert!(host_view.permissions.can_validate_answer);
        let panel = host_view.validation.unwrap();
        assert!(!panel.final_round);
        assert_eq!(panel.question, "Capital of France?");
        assert_eq!(host_view.bottom, BottomPanel::None);

        let player_view = resolve(&snap, "p2", None, t);
        assert!(player_view.validation.is_none());
        match player_view.top {
            TopPanel::Question { countdown, .. } => {
                assert_eq!(countdown.unwrap().initial_progress, 1.0);
            }
            other => panic!("expected question panel, got {other:?}"),
        }
    }

    #[test]
    fn final_round_validation_shows_current_players_answer() {
        let mut snap = room(
            RoomPhase::ValidatingFinalRoundAnswers,
            vec![player("p1", 300, Some(100), true)],
            Some("p1"),
        );
        snap.final_round_state = Some(FinalRoundState::Visible(VisibleFinalRoundState {
            available_categories: None,
            question: Some(crate::model::FinalRoundQuestion {
                text: "Largest ocean?".into(),
                attachment: None,
                answers: vec!["Pacific".into()],
                comment: None,
            }),
            players: vec!["p1".into()],
            players_answers: Some(BTreeMap::from([("p1".into(), "pacific".into())])),
            timer_ends_at: None,
        }));

        let view = resolve(&snap, "host", None, now());
        let panel = view.validation.unwrap();
        assert!(panel.final_round);
        assert_eq!(panel.player_answer.as_deref(), Some("pacific"));
        assert_eq!(panel.answers, vec!["Pacific".to_string()]);
        assert!(view.permissions.can_validate_final_round_answer);
        assert_eq!(resolve(&snap, "p1", None, now()).bottom, BottomPanel::None);
    }

    #[test]
    fn final_round_answer_requires_allowed_list() {
        let mut snap = room(
            RoomPhase::ShowingFinalRoundQuestion,
            vec![player("p1", 300, Some(100), true), player("p2", 0, None, true)],
            None,
        );
        snap.allowed_to_answer = vec!["p1".into()];

        assert_eq!(
            resolve(&snap, "p1", None, now()).bottom,
            BottomPanel::FinalAnswer { enabled: true }
        );
        assert_eq!(
            resolve(&snap, "p2", None, now()).bottom,
            BottomPanel::FinalAnswer { enabled: false }
        );
    }

    #[test]
    fn waiting_and_game_over_have_no_action_panel() {
        for phase in [RoomPhase::WaitingForStart, RoomPhase::GameOver] {
            let snap = room(phase, vec![player("p1", 200, None, true)], None);
            let view = resolve(&snap, "p1", None, now());
            assert_eq!(view.bottom, BottomPanel::None, "{}", snap.state);
            assert!(!view.permissions.can_buzz);
        }

        // The board phase still shows a disabled buzzer.
        let snap = room(
            RoomPhase::SelectingQuestion,
            vec![player("p1", 200, None, true)],
            None,
        );
        assert_eq!(
            resolve(&snap, "p1", None, now()).bottom,
            BottomPanel::Buzzer { enabled: false }
        );
    }

    #[test]
    fn final_round_categories_are_removed_by_host_or_current_player() {
        let mut snap = room(
            RoomPhase::SelectingFinalRoundCategory,
            vec![player("p1", 300, None, true), player("p2", 100, None, true)],
            Some("p1"),
        );
        snap.final_round_state = Some(FinalRoundState::Visible(VisibleFinalRoundState {
            available_categories: Some(BTreeMap::from([
                ("Art".to_string(), true),
                ("Film".to_string(), false),
                ("Music".to_string(), true),
            ])),
            question: None,
            players: vec!["p1".into(), "p2".into()],
            players_answers: None,
            timer_ends_at: None,
        }));
        let remove = |category: &str| ClientCommand::RemoveFinalRoundCategory {
            category: category.into(),
        };

        let p1 = permissions(&snap, "p1");
        assert!(p1.can_remove_final_round_category);
        assert_eq!(
            p1.removable_categories,
            vec!["Art".to_string(), "Music".to_string()]
        );
        assert!(p1.allows(&remove("Art")));
        assert!(!p1.allows(&remove("Film")), "already removed");
        assert!(!p1.allows(&remove("Sport")), "not in the pool");

        assert!(permissions(&snap, "host").allows(&remove("Music")));

        let p2 = permissions(&snap, "p2");
        assert!(!p2.can_remove_final_round_category);
        assert!(!p2.allows(&remove("Art")));

        assert_eq!(
            resolve(&snap, "p2", None, now()).top,
            TopPanel::FinalRoundCategories {
                categories: vec!["Art".to_string(), "Music".to_string()]
            }
        );
    }

    #[test]
    fn final_round_betting_needs_score_and_no_bet() {
        let snap = room(
            RoomPhase::FinalRoundBetting,
            vec![
                player("p1", 400, None, true),
                player("p2", 0, None, true),
                player("p3", 250, Some(50), true),
            ],
            None,
        );

        let p1 = permissions(&snap, "p1");
        assert!(p1.can_place_final_round_bet);
        assert!(p1.allows(&ClientCommand::PlaceFinalRoundBet { amount: 400 }));
        assert!(!p1.allows(&ClientCommand::PlaceFinalRoundBet { amount: 401 }));
        assert!(!p1.allows(&ClientCommand::PlaceBet { amount: 10 }));
        assert_eq!(
            resolve(&snap, "p1", None, now()).bottom,
            BottomPanel::Betting {
                max: 400,
                enabled: true,
                final_round: true
            }
        );

        assert!(!permissions(&snap, "p2").can_place_final_round_bet);
        assert!(!permissions(&snap, "p3").can_place_final_round_bet);
        assert_eq!(
            resolve(&snap, "p3", None, now()).bottom,
            BottomPanel::Betting {
                max: 250,
                enabled: false,
                final_round: true
            }
        );
        assert_eq!(
            resolve(&snap, "host", None, now()).top,
            status("Final round!", Some("Place your bet"))
        );
    }

    #[test]
    fn overlay_replaces_top_panel() {
        let snap = room(RoomPhase::SelectingQuestion, vec![], Some("p1"));
        let intro = Overlay::Intro(RoundIntro {
            round_name: "Round 2".into(),
            category_names: vec!["Art".into()],
        });
        let view = resolve(&snap, "p1", Some(&intro), now());
        assert!(matches!(view.top, TopPanel::RoundIntro(_)));
        // Permissions do not depend on the overlay.
        assert!(view.permissions.can_select_question);
    }

    #[test]
    fn game_over_co_renders_reveal_only() {
        let snap = room(RoomPhase::GameOver, vec![], None);
        let reveal = Overlay::Reveal(AnswerReveal {
            answers: vec!["Pacific".into(), "Pacific Ocean".into()],
            comment: Some("Covers a third of the planet".into()),
            duration_seconds: 5,
        });
        assert_eq!(
            resolve(&snap, "p1", Some(&reveal), now()).top,
            TopPanel::AnswerReveal {
                answers: "Pacific, Pacific Ocean".into(),
                comment: Some("Covers a third of the planet".into()),
            }
        );

        let intro = Overlay::Intro(RoundIntro {
            round_name: "Round 2".into(),
            category_names: vec![],
        });
        assert_eq!(
            resolve(&snap, "p1", Some(&intro), now()).top,
            status("Game over!", None)
        );
    }

    #[test]
    fn unknown_phase_renders_placeholder() {
        let snap = room(
            RoomPhase::Unrecognized("tiebreak".into()),
            vec![player("p1", 0, None, true)],
            None,
        );
        let view = resolve(&snap, "p1", None, now());
        assert_eq!(
            view.top,
            TopPanel::Unrecognized {
                message: "Unexpected room state: tiebreak".into()
            }
        );
        assert_eq!(view.permissions, Permissions::default());
    }

    #[test]
    fn host_controls() {
        let snap = room(RoomPhase::WaitingForStart, vec![player("p1", 0, None, true)], None);
        assert!(permissions(&snap, "host").can_start_game);
        assert!(permissions(&snap, "host").can_toggle_pause);
        assert!(!permissions(&snap, "p1").can_start_game);
        assert!(!permissions(&snap, "p1").can_toggle_pause);
        assert!(permissions(&snap, "p1").allows(&ClientCommand::Chat { text: "hi".into() }));
        assert_eq!(
            resolve(&snap, "host", None, now()).top,
            status("Waiting for start", None)
        );
        assert_eq!(resolve(&snap, "host", None, now()).bottom, BottomPanel::None);
    }
}
