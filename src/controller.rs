use log::debug;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Duration,
};

use crate::{
    channel::BusHandle,
    message::{Player, TimerMessage},
};

/// Display-only copy of the clock on the Master side, reconstructed entirely
/// from received broadcasts. Command methods update it optimistically so the
/// operator UI responds before the round trip, but the next `TIMER_UPDATE`
/// overwrites it unconditionally: the Audience clock is the only writer that
/// counts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MirrorState {
    pub time1: Duration,
    pub time2: Duration,
    pub active_player: Player,
    pub skip_active: bool,
    /// `timestamp` of the latest `TIMER_UPDATE`, Unix milliseconds.
    pub last_update: Option<i64>,
}

/// Broadcast outcomes the Master-side duel logic reacts to. Scoring and
/// slide advancement are the caller's concern, not the timer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    PlayerTimeout { loser: Player },
    SkipEnd { switch_to: Player },
}

/// Master-side command surface for the authoritative clock. Issues commands
/// over the wire and mirrors the last broadcast state; never decrements time
/// itself.
#[derive(Debug)]
pub struct TimerController {
    handle: BusHandle,
    mirror_tx: Arc<watch::Sender<MirrorState>>,
    mirror_rx: watch::Receiver<MirrorState>,
    listen_join: JoinHandle<()>,
}

impl TimerController {
    pub fn new(handle: BusHandle) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (mirror_tx, mirror_rx) = watch::channel(MirrorState::default());
        let mirror_tx = Arc::new(mirror_tx);

        let mut bus_rx = handle.subscribe();
        let mirror = mirror_tx.clone();
        let listen_join = tokio::spawn(async move {
            while let Some(message) = bus_rx.recv().await {
                match message {
                    TimerMessage::TimerUpdate {
                        time1,
                        time2,
                        active_player,
                        timestamp,
                    } => {
                        // Last writer wins; there is only one writer
                        mirror.send_modify(|state| {
                            state.time1 = secs(time1);
                            state.time2 = secs(time2);
                            state.active_player = active_player;
                            state.last_update = Some(timestamp);
                        });
                    }
                    TimerMessage::SkipEnd { switch_to_player } => {
                        mirror.send_modify(|state| {
                            state.skip_active = false;
                            state.active_player = switch_to_player;
                        });
                        if event_tx
                            .send(ControllerEvent::SkipEnd {
                                switch_to: switch_to_player,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    TimerMessage::PlayerTimeout { loser } => {
                        if event_tx
                            .send(ControllerEvent::PlayerTimeout { loser })
                            .is_err()
                        {
                            break;
                        }
                    }
                    // The connection monitor's concern
                    TimerMessage::AudienceHeartbeat => {}
                    other => debug!("ignoring message on master side: {other:?}"),
                }
            }
        });

        (
            Self {
                handle,
                mirror_tx,
                mirror_rx,
                listen_join,
            },
            event_rx,
        )
    }

    /// Mirrored state for the operator display.
    pub fn mirror(&self) -> watch::Receiver<MirrorState> {
        self.mirror_rx.clone()
    }

    pub fn send_start(&self, time1: Duration, time2: Duration, active_player: Player) {
        self.mirror_tx.send_modify(|state| {
            state.time1 = time1;
            state.time2 = time2;
            state.active_player = active_player;
            state.skip_active = false;
        });
        self.handle.send(&TimerMessage::TimerStart {
            player1_time: time1.as_secs_f64(),
            player2_time: time2.as_secs_f64(),
            active_player,
        });
    }

    pub fn send_pause(&self) {
        self.handle.send(&TimerMessage::TimerPause);
    }

    pub fn send_resume(&self, active_player: Player) {
        self.mirror_tx
            .send_modify(|state| state.active_player = active_player);
        self.handle.send(&TimerMessage::TimerResume { active_player });
    }

    pub fn send_switch(&self, active_player: Player) {
        self.mirror_tx
            .send_modify(|state| state.active_player = active_player);
        self.handle.send(&TimerMessage::TimerSwitch { active_player });
    }

    pub fn send_skip_start(&self, answer: &str, active_player: Player) {
        self.mirror_tx.send_modify(|state| state.skip_active = true);
        self.handle.send(&TimerMessage::SkipStart {
            answer: answer.to_string(),
            active_player,
        });
    }

    pub fn send_duel_end(&self) {
        self.mirror_tx
            .send_modify(|state| state.skip_active = false);
        self.handle.send(&TimerMessage::DuelEnd);
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.listen_join.abort();
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        channel::MessageBus,
        clock::{AuthoritativeClock, TICK_INTERVAL},
        snapshot::SnapshotStore,
    };
    use more_asserts::*;
    use tokio::time::sleep;

    const CHANNEL: &str = "duel";

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_mirror_before_round_trip() {
        let bus = MessageBus::new();
        let (controller, _events) = TimerController::new(bus.open(CHANNEL));

        controller.send_start(
            Duration::from_secs(45),
            Duration::from_secs(45),
            Player::Two,
        );

        let mirror = controller.mirror().borrow().clone();
        assert_eq!(mirror.time1, Duration::from_secs(45));
        assert_eq!(mirror.time2, Duration::from_secs(45));
        assert_eq!(mirror.active_player, Player::Two);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mirror_converges_within_one_broadcast() {
        let bus = MessageBus::new();
        let (_clock, _clock_events) =
            AuthoritativeClock::new(bus.open(CHANNEL), SnapshotStore::disabled());
        let (controller, _events) = TimerController::new(bus.open(CHANNEL));

        controller.send_start(
            Duration::from_secs(30),
            Duration::from_secs(30),
            Player::One,
        );
        sleep(Duration::from_millis(1000)).await;

        let mirror = controller.mirror().borrow().clone();
        assert!(mirror.last_update.is_some());
        // Authoritative overwrite happened and is at most one broadcast stale
        assert_lt!(mirror.time1, Duration::from_secs(30));
        assert_ge!(
            mirror.time1,
            Duration::from_secs(29).saturating_sub(2 * TICK_INTERVAL)
        );
        assert_eq!(mirror.time2, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_event_forwarded() {
        let bus = MessageBus::new();
        let (_clock, _clock_events) =
            AuthoritativeClock::new(bus.open(CHANNEL), SnapshotStore::disabled());
        let (controller, mut events) = TimerController::new(bus.open(CHANNEL));

        controller.send_start(
            Duration::from_secs_f64(0.5),
            Duration::from_secs(30),
            Player::One,
        );
        sleep(Duration::from_millis(700)).await;

        assert_eq!(
            events.try_recv(),
            Ok(ControllerEvent::PlayerTimeout {
                loser: Player::One
            })
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_end_updates_mirror_and_notifies() {
        let bus = MessageBus::new();
        let (_clock, _clock_events) =
            AuthoritativeClock::new(bus.open(CHANNEL), SnapshotStore::disabled());
        let (controller, mut events) = TimerController::new(bus.open(CHANNEL));

        controller.send_start(
            Duration::from_secs(30),
            Duration::from_secs(30),
            Player::One,
        );
        controller.send_skip_start("Paris", Player::One);
        assert!(controller.mirror().borrow().skip_active);

        sleep(Duration::from_millis(3200)).await;

        assert_eq!(
            events.try_recv(),
            Ok(ControllerEvent::SkipEnd {
                switch_to: Player::Two
            })
        );
        let mirror = controller.mirror().borrow().clone();
        assert!(!mirror.skip_active);
        assert_eq!(mirror.active_player, Player::Two);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_never_advances_time_alone() {
        let bus = MessageBus::new();
        // No audience on the channel at all
        let (controller, _events) = TimerController::new(bus.open(CHANNEL));

        controller.send_start(
            Duration::from_secs(30),
            Duration::from_secs(30),
            Player::One,
        );
        sleep(Duration::from_millis(5000)).await;

        let mirror = controller.mirror().borrow().clone();
        assert_eq!(mirror.time1, Duration::from_secs(30));
        assert_eq!(mirror.last_update, None);
    }
}
