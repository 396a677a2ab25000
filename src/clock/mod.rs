use log::info;
use tokio::time::{Duration, Instant};

use crate::message::Player;

mod runner;
pub use runner::{AuthoritativeClock, SNAPSHOT_PERIOD_BROADCASTS, TICK_INTERVAL};

/// Fixed length of the skip reveal window, measured from activation on the
/// wall clock, independent of the countdown tick rate.
pub const SKIP_DURATION: Duration = Duration::from_millis(3000);

/// A skip reveal in progress: the answer is shown for exactly
/// [`SKIP_DURATION`], then play passes to the other player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipAnimation {
    answer: String,
    started_at: Instant,
}

impl SkipAnimation {
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + SKIP_DURATION
    }
}

/// Events the clock reports to the duel logic. Each is also broadcast on the
/// wire by the [`AuthoritativeClock`] driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    PlayerTimeout { loser: Player },
    SkipEnd { switch_to: Player },
}

/// Read-only view of the clock for display consumers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClockSnapshot {
    pub time1: Duration,
    pub time2: Duration,
    pub active_player: Player,
    pub is_running: bool,
    pub skip_answer: Option<String>,
}

impl ClockSnapshot {
    pub fn is_skip_active(&self) -> bool {
        self.skip_answer.is_some()
    }
}

/// The single source of truth for duel time. Owned exclusively by the
/// Audience-side driver; every other view of the countdown is a read-only
/// mirror reconstructed from broadcasts.
///
/// All methods take `now` explicitly, so the countdown is driven by elapsed
/// wall-clock time rather than tick count and the state machine is testable
/// with simulated instants.
#[derive(Debug)]
pub struct DuelClock {
    time1: Duration,
    time2: Duration,
    active_player: Player,
    running: bool,
    last_update: Instant,
    skip: Option<SkipAnimation>,
    expired: Option<Player>,
}

impl DuelClock {
    pub fn new(now: Instant) -> Self {
        Self {
            time1: Duration::ZERO,
            time2: Duration::ZERO,
            active_player: Player::One,
            running: false,
            last_update: now,
            skip: None,
            expired: None,
        }
    }

    pub fn time1(&self) -> Duration {
        self.time1
    }

    pub fn time2(&self) -> Duration {
        self.time2
    }

    pub fn active_player(&self) -> Player {
        self.active_player
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn skip(&self) -> Option<&SkipAnimation> {
        self.skip.as_ref()
    }

    pub fn skip_deadline(&self) -> Option<Instant> {
        self.skip.as_ref().map(SkipAnimation::deadline)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            time1: self.time1,
            time2: self.time2,
            active_player: self.active_player,
            is_running: self.running,
            skip_answer: self.skip.as_ref().map(|skip| skip.answer.clone()),
        }
    }

    fn active_time(&self) -> Duration {
        match self.active_player {
            Player::One => self.time1,
            Player::Two => self.time2,
        }
    }

    fn active_time_mut(&mut self) -> &mut Duration {
        match self.active_player {
            Player::One => &mut self.time1,
            Player::Two => &mut self.time2,
        }
    }

    fn status_string(&self) -> String {
        format!(
            "[{:.1}s/{:.1}s P{} {}]",
            self.time1.as_secs_f64(),
            self.time2.as_secs_f64(),
            self.active_player,
            if self.running { "running" } else { "stopped" },
        )
    }

    /// `TIMER_START`: load fresh times, start counting down for
    /// `active_player`, and reset the elapsed-time anchor. Applying this on
    /// top of any state is safe; the last start wins.
    pub fn apply_start(
        &mut self,
        time1: Duration,
        time2: Duration,
        active_player: Player,
        now: Instant,
    ) {
        self.time1 = time1;
        self.time2 = time2;
        self.active_player = active_player;
        self.running = true;
        self.last_update = now;
        self.expired = None;
        info!("{} Timer started", self.status_string());
    }

    /// `TIMER_PAUSE`: freeze the countdown. Idempotent.
    pub fn pause(&mut self) {
        self.running = false;
        info!("{} Timer paused", self.status_string());
    }

    /// `TIMER_RESUME`: continue counting down for `active_player` from the
    /// current times, anchored at `now`.
    pub fn resume(&mut self, active_player: Player, now: Instant) {
        self.active_player = active_player;
        self.running = true;
        self.last_update = now;
        info!("{} Timer resumed", self.status_string());
    }

    /// `TIMER_SWITCH`: change whose time decreases without touching the
    /// running state. The anchor resets so no elapsed time leaks from one
    /// player to the other.
    pub fn switch(&mut self, active_player: Player, now: Instant) {
        self.active_player = active_player;
        self.last_update = now;
        info!("{} Active player switched", self.status_string());
    }

    /// `SKIP_START`: begin (or restart) the reveal window. A skip started
    /// while one is already active replaces it and the window starts over.
    pub fn start_skip(&mut self, answer: String, now: Instant) {
        self.skip = Some(SkipAnimation {
            answer,
            started_at: now,
        });
        info!("{} Skip started", self.status_string());
    }

    /// `DUEL_END`: stop the countdown and discard any active skip, which
    /// also cancels its pending completion.
    pub fn end_duel(&mut self) {
        self.running = false;
        self.skip = None;
        info!("{} Duel ended", self.status_string());
    }

    /// One countdown step: decrement the active player's remaining time by
    /// the real time elapsed since the previous step, clamped at zero. On
    /// the tick where the time crosses from positive to zero the clock stops
    /// and reports the loser, exactly once per expiry.
    pub fn tick(&mut self, now: Instant) -> Option<ClockEvent> {
        if !self.running {
            return None;
        }
        let elapsed = now.duration_since(self.last_update);
        self.last_update = now;

        let active = self.active_player;
        let remaining = self.active_time_mut();
        let was_positive = !remaining.is_zero();
        *remaining = remaining.saturating_sub(elapsed);

        if was_positive && self.active_time().is_zero() {
            self.running = false;
            self.expired = Some(active);
            info!("{} Player {active} out of time", self.status_string());
            return Some(ClockEvent::PlayerTimeout { loser: active });
        }
        None
    }

    /// Resolves the skip window. If the active player ran out of time during
    /// the reveal the result is a timeout, not a switch; otherwise play
    /// passes to the other player. Returns `None` when no skip is active or
    /// when the expiry was already reported by the countdown.
    pub fn complete_skip(&mut self, now: Instant) -> Option<ClockEvent> {
        self.skip.take()?;

        let active = self.active_player;
        if self.active_time().is_zero() {
            if self.expired == Some(active) {
                info!("{} Skip cleared after expiry", self.status_string());
                return None;
            }
            self.running = false;
            self.expired = Some(active);
            info!("{} Player {active} out of time at skip end", self.status_string());
            return Some(ClockEvent::PlayerTimeout { loser: active });
        }

        let next = active.other();
        self.active_player = next;
        self.last_update = now;
        info!("{} Skip complete, play passes to {next}", self.status_string());
        Some(ClockEvent::SkipEnd { switch_to: next })
    }
}
