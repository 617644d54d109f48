//! Countdown interpolation between discrete server updates.
//!
//! A snapshot carries one sample of a countdown: the progress fraction the
//! server last computed and the wall-clock instant the countdown ends. The
//! [`TimerInterpolator`] turns that single sample into a continuously
//! decreasing progress value using only locally observed elapsed time, so
//! server and client clocks never need to agree beyond the one anchor.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One countdown sample taken when a countdown panel mounts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountdownSeed {
    /// Fraction of the countdown still remaining, in `[0, 1]`.
    pub initial_progress: f64,
    /// Time left until the countdown reaches zero.
    pub remaining: Duration,
}

impl CountdownSeed {
    /// Progress is clamped to `[0, 1]`; NaN counts as expired.
    pub fn new(initial_progress: f64, remaining: Duration) -> Self {
        let initial_progress = if initial_progress.is_nan() {
            0.0
        } else {
            initial_progress.clamp(0.0, 1.0)
        };
        Self {
            initial_progress,
            remaining,
        }
    }

    /// Seed from a server deadline, anchored once against the local wall clock.
    /// Deadlines already in the past yield a zero remaining duration.
    pub fn until(deadline: OffsetDateTime, initial_progress: f64, now: OffsetDateTime) -> Self {
        let remaining = Duration::try_from(deadline - now).unwrap_or(Duration::ZERO);
        Self::new(initial_progress, remaining)
    }
}

/// Reconstructs a continuous countdown from a [`CountdownSeed`].
///
/// `total = remaining / initial_progress`, and the countdown is treated as
/// having started `total * (1 - initial_progress)` before the anchor.
#[derive(Debug, Clone, Copy)]
pub struct TimerInterpolator {
    anchor: Instant,
    /// Portion of `total` that had already elapsed at `anchor`.
    elapsed_before: Duration,
    /// `None` when the seed was already expired.
    total: Option<Duration>,
}

impl TimerInterpolator {
    pub fn start(seed: CountdownSeed, now: Instant) -> Self {
        let total = if seed.initial_progress <= 0.0 || seed.remaining.is_zero() {
            None
        } else {
            // A vanishing progress sample would overflow `Duration`; treat it as expired.
            Duration::try_from_secs_f64(seed.remaining.as_secs_f64() / seed.initial_progress).ok()
        };
        let elapsed_before = total
            .map(|t| t.mul_f64(1.0 - seed.initial_progress))
            .unwrap_or_default();
        Self {
            anchor: now,
            elapsed_before,
            total,
        }
    }

    /// Progress at `now`: `max(0, 1 - elapsed / total)`.
    pub fn progress_at(&self, now: Instant) -> f64 {
        let Some(total) = self.total else {
            return 0.0;
        };
        let elapsed = self.elapsed_before + now.saturating_duration_since(self.anchor);
        (1.0 - elapsed.as_secs_f64() / total.as_secs_f64()).max(0.0)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.progress_at(now) <= 0.0
    }

    /// Reconstructed full length of the countdown, if it had not expired.
    pub fn total(&self) -> Option<Duration> {
        self.total
    }
}

/// A running countdown that publishes progress once per frame.
///
/// The frame task stops on its own once progress reaches zero and is
/// aborted when the `Countdown` is dropped.
#[derive(Debug)]
pub struct Countdown {
    progress: watch::Receiver<f64>,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Start ticking every `frame_interval`. Must be called inside a tokio runtime.
    pub fn spawn(seed: CountdownSeed, frame_interval: Duration) -> Self {
        let interpolator = TimerInterpolator::start(seed, Instant::now());
        let (tx, rx) = watch::channel(interpolator.progress_at(Instant::now()));
        let frame_interval = frame_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut frames = tokio::time::interval(frame_interval);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                frames.tick().await;
                let progress = interpolator.progress_at(Instant::now());
                if tx.send(progress).is_err() || progress <= 0.0 {
                    break;
                }
            }
        });

        Self { progress: rx, task }
    }

    /// Latest published progress.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// A receiver notified on every frame.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Whether the frame task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
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

    const EPSILON: f64 = 1e-9;

    #[test]
    fn full_countdown_decreases_to_zero_over_its_duration() {
        let t0 = Instant::now();
        let timer = TimerInterpolator::start(
            CountdownSeed::new(1.0, Duration::from_millis(10_000)),
            t0,
        );

        assert!((timer.progress_at(t0) - 1.0).abs() < EPSILON);

        let mut previous = 1.0;
        for ms in (0..=12_000).step_by(500) {
            let p = timer.progress_at(t0 + Duration::from_millis(ms));
            assert!(p <= previous, "progress must never increase");
            previous = p;
        }
        assert!((timer.progress_at(t0 + Duration::from_secs(5)) - 0.5).abs() < EPSILON);
        assert_eq!(timer.progress_at(t0 + Duration::from_secs(10)), 0.0);
        assert!(timer.is_expired_at(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn zero_initial_progress_is_expired_regardless_of_remaining() {
        let t0 = Instant::now();
        let timer =
            TimerInterpolator::start(CountdownSeed::new(0.0, Duration::from_secs(30)), t0);
        assert_eq!(timer.progress_at(t0), 0.0);
        assert!(timer.total().is_none());
    }

    #[test]
    fn partial_seed_reconstructs_total_duration() {
        let t0 = Instant::now();
        let timer =
            TimerInterpolator::start(CountdownSeed::new(0.25, Duration::from_secs(5)), t0);
        assert_eq!(timer.total(), Some(Duration::from_secs(20)));
        assert!((timer.progress_at(t0) - 0.25).abs() < EPSILON);
        assert_eq!(timer.progress_at(t0 + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn seed_from_past_deadline_has_no_time_left() {
        let now = OffsetDateTime::now_utc();
        let seed = CountdownSeed::until(now - time::Duration::seconds(3), 0.8, now);
        assert_eq!(seed.remaining, Duration::ZERO);

        let seed = CountdownSeed::until(now + time::Duration::seconds(3), 1.7, now);
        assert_eq!(seed.remaining, Duration::from_secs(3));
        assert_eq!(seed.initial_progress, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_until_zero_then_stops() {
        let countdown = Countdown::spawn(
            CountdownSeed::new(1.0, Duration::from_millis(200)),
            Duration::from_millis(16),
        );
        let mut rx = countdown.subscribe();

        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }

        assert!(seen.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(*seen.last().unwrap(), 0.0);
        assert!(countdown.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_countdown_cancels_frames() {
        let countdown = Countdown::spawn(
            CountdownSeed::new(1.0, Duration::from_secs(60)),
            Duration::from_millis(16),
        );
        let mut rx = countdown.subscribe();
        drop(countdown);
        // The sender is released once the aborted task is torn down.
        while rx.changed().await.is_ok() {}
        assert!(*rx.borrow() > 0.0);
    }
}
