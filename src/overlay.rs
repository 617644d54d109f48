//! Sequencing of transient, self-expiring overlays.
//!
//! Two overlays exist: the round intro and the correct-answer reveal. A
//! reveal always preempts whatever is showing; an intro that arrives while a
//! reveal is on screen waits in a single pending slot and is shown when the
//! reveal expires. Both carry a deadline so the session loop can drive
//! expiry with one `sleep_until`.

use std::time::Duration;

use tokio::time::Instant;

use crate::model::{AnswerReveal, RoundIntro};

/// Reading-speed policy for the round intro.
///
/// The intro shows the category line; when it is wider than the viewport it
/// scrolls at `chars_per_second`, framed by a pause on each side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntroTiming {
    pub chars_per_second: f64,
    pub pause_before: Duration,
    pub pause_after: Duration,
    /// Number of characters that fit on screen without scrolling.
    pub viewport_chars: usize,
}

impl Default for IntroTiming {
    fn default() -> Self {
        Self {
            chars_per_second: 5.0,
            pause_before: Duration::from_secs(2),
            pause_after: Duration::from_secs(2),
            viewport_chars: 40,
        }
    }
}

impl IntroTiming {
    /// Total on-screen time for an intro whose scrolling line is `text`.
    pub fn duration_for(&self, text: &str) -> Duration {
        self.pause_before
            + intro_duration(text, self.viewport_chars, self.chars_per_second)
            + self.pause_after
    }
}

/// Scroll time for `text` in a viewport `viewport_chars` wide.
///
/// Zero when the text fits. A non-positive reading speed never scrolls.
pub fn intro_duration(text: &str, viewport_chars: usize, chars_per_second: f64) -> Duration {
    let overflow = text.chars().count().saturating_sub(viewport_chars);
    if overflow == 0 || chars_per_second.is_nan() || chars_per_second <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(overflow as f64 / chars_per_second)
}

/// An overlay currently shown atop the phase view.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Intro(RoundIntro),
    Reveal(AnswerReveal),
}

/// Which overlay, if any, is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Idle,
    ShowingReveal,
    ShowingIntro,
}

#[derive(Debug, Clone)]
struct Showing {
    overlay: Overlay,
    until: Instant,
}

/// The overlay state machine of one room view.
#[derive(Debug, Clone, Default)]
pub struct OverlayQueue {
    showing: Option<Showing>,
    pending_intro: Option<RoundIntro>,
    timing: IntroTiming,
}

impl OverlayQueue {
    pub fn new(timing: IntroTiming) -> Self {
        Self {
            showing: None,
            pending_intro: None,
            timing,
        }
    }

    pub fn state(&self) -> OverlayState {
        match &self.showing {
            None => OverlayState::Idle,
            Some(Showing {
                overlay: Overlay::Reveal(_),
                ..
            }) => OverlayState::ShowingReveal,
            Some(Showing {
                overlay: Overlay::Intro(_),
                ..
            }) => OverlayState::ShowingIntro,
        }
    }

    pub fn active(&self) -> Option<&Overlay> {
        self.showing.as_ref().map(|s| &s.overlay)
    }

    pub fn pending_intro(&self) -> Option<&RoundIntro> {
        self.pending_intro.as_ref()
    }

    /// When the active overlay ends, if one is showing.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.showing.as_ref().map(|s| s.until)
    }

    /// A round intro arrived. Waits behind a showing reveal, replacing any
    /// intro already waiting; otherwise shows immediately.
    pub fn on_intro(&mut self, intro: RoundIntro, now: Instant) {
        if self.state() == OverlayState::ShowingReveal {
            if let Some(dropped) = self.pending_intro.replace(intro) {
                tracing::debug!(round = %dropped.round_name, "pending round intro superseded");
            }
            return;
        }
        self.show_intro(intro, now);
    }

    /// A correct-answer reveal arrived. Always shown immediately.
    pub fn on_reveal(&mut self, reveal: AnswerReveal, now: Instant) {
        let until = now + reveal.duration();
        self.showing = Some(Showing {
            overlay: Overlay::Reveal(reveal),
            until,
        });
    }

    /// The reveal's time is up. Promotes the pending intro if there is one.
    pub fn on_reveal_expire(&mut self, now: Instant) {
        if self.state() != OverlayState::ShowingReveal {
            return;
        }
        match self.pending_intro.take() {
            Some(intro) => self.show_intro(intro, now),
            None => self.showing = None,
        }
    }

    /// The intro finished scrolling.
    pub fn on_intro_finish(&mut self) {
        if self.state() == OverlayState::ShowingIntro {
            self.showing = None;
        }
    }

    /// Fire every transition whose deadline is at or before `now`.
    ///
    /// Returns `true` if the active overlay changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some(until) = self.next_deadline() {
            if until > now {
                break;
            }
            match self.state() {
                OverlayState::ShowingReveal => self.on_reveal_expire(until),
                OverlayState::ShowingIntro => self.on_intro_finish(),
                OverlayState::Idle => break,
            }
            changed = true;
        }
        changed
    }

    /// Drop everything. Used when the room view is torn down.
    pub fn clear(&mut self) {
        self.showing = None;
        self.pending_intro = None;
    }

    fn show_intro(&mut self, intro: RoundIntro, now: Instant) {
        let until = now + self.timing.duration_for(&intro.category_line());
        self.showing = Some(Showing {
            overlay: Overlay::Intro(intro),
            until,
        });
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

    fn intro(name: &str) -> RoundIntro {
        RoundIntro {
            round_name: name.into(),
            category_names: vec!["History".into(), "Music".into()],
        }
    }

    fn reveal(seconds: u64) -> AnswerReveal {
        AnswerReveal {
            answers: vec!["Paris".into()],
            comment: None,
            duration_seconds: seconds,
        }
    }

    fn intro_name(queue: &OverlayQueue) -> Option<&str> {
        match queue.active() {
            Some(Overlay::Intro(i)) => Some(&i.round_name),
            _ => None,
        }
    }

    #[test]
    fn short_text_only_pauses() {
        let timing = IntroTiming::default();
        assert_eq!(timing.duration_for("History, Music"), Duration::from_secs(4));
    }

    #[test]
    fn overflowing_text_scrolls_at_reading_speed() {
        let timing = IntroTiming::default();
        let text = "x".repeat(50);
        // 10 overflow chars at 5 chars/s.
        assert_eq!(intro_duration(&text, 40, 5.0), Duration::from_secs(2));
        assert_eq!(timing.duration_for(&text), Duration::from_secs(6));
        assert_eq!(intro_duration(&text, 40, 0.0), Duration::ZERO);
    }

    #[test]
    fn intro_shows_immediately_when_idle() {
        let now = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_intro(intro("Round 1"), now);
        assert_eq!(queue.state(), OverlayState::ShowingIntro);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(4)));

        queue.on_intro_finish();
        assert_eq!(queue.state(), OverlayState::Idle);
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn intro_waits_for_reveal_to_expire() {
        let t0 = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_reveal(reveal(5), t0);
        queue.on_intro(intro("B"), t0 + Duration::from_secs(1));

        assert_eq!(queue.state(), OverlayState::ShowingReveal);
        assert!(!queue.tick(t0 + Duration::from_millis(4_999)));
        assert_eq!(queue.state(), OverlayState::ShowingReveal);

        assert!(queue.tick(t0 + Duration::from_secs(5)));
        assert_eq!(intro_name(&queue), Some("B"));
        assert!(queue.pending_intro().is_none());
    }

    #[test]
    fn later_intro_replaces_pending_one() {
        let t0 = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_reveal(reveal(5), t0);
        queue.on_intro(intro("B"), t0 + Duration::from_secs(1));
        queue.on_intro(intro("C"), t0 + Duration::from_secs(2));

        queue.tick(t0 + Duration::from_secs(5));
        assert_eq!(intro_name(&queue), Some("C"));

        // B never shows: after C finishes the queue is idle.
        queue.tick(t0 + Duration::from_secs(60));
        assert_eq!(queue.state(), OverlayState::Idle);
    }

    #[test]
    fn reveal_preempts_showing_intro() {
        let t0 = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_intro(intro("A"), t0);
        queue.on_reveal(reveal(3), t0 + Duration::from_secs(1));
        assert_eq!(queue.state(), OverlayState::ShowingReveal);

        queue.tick(t0 + Duration::from_secs(4));
        assert_eq!(queue.state(), OverlayState::Idle);
    }

    #[test]
    fn stale_expiry_signals_are_ignored() {
        let t0 = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_intro(intro("A"), t0);
        queue.on_reveal_expire(t0);
        assert_eq!(queue.state(), OverlayState::ShowingIntro);

        queue.on_reveal(reveal(5), t0);
        queue.on_intro_finish();
        assert_eq!(queue.state(), OverlayState::ShowingReveal);
    }

    #[test]
    fn zero_length_reveal_expires_on_next_tick() {
        let t0 = Instant::now();
        let mut queue = OverlayQueue::default();
        queue.on_reveal(reveal(0), t0);
        assert!(queue.tick(t0));
        assert_eq!(queue.state(), OverlayState::Idle);
    }
}
