use log::{debug, warn};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Duration, Instant, MissedTickBehavior, interval, sleep_until},
};

use crate::{
    channel::BusHandle,
    clock::{ClockEvent, ClockSnapshot, DuelClock},
    connection::HeartbeatSender,
    message::{Player, TimerMessage, unix_millis},
    snapshot::{SnapshotStore, TimerSnapshot},
};

/// Cadence of both the countdown loop and the state broadcast. The two run
/// on independent intervals so the broadcast rate survives any future change
/// to countdown precision.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// A snapshot is persisted every this many broadcasts, roughly once per
/// second. A reloaded Audience context resumes from it with up to ~1s of
/// drift; that loss is accepted, not hidden.
pub const SNAPSHOT_PERIOD_BROADCASTS: u32 = 10;

/// Audience-side driver that owns the [`DuelClock`] and is the sole sender
/// of `TIMER_UPDATE` broadcasts. It applies commands from the Master, runs
/// the countdown and skip timers, heartbeats continuously regardless of duel
/// state, and persists periodic snapshots for reload recovery.
///
/// Dropping this aborts the run loop and the heartbeat; every timer the
/// driver schedules dies with it.
#[derive(Debug)]
pub struct AuthoritativeClock {
    cmd_tx: mpsc::UnboundedSender<LocalCommand>,
    state_rx: watch::Receiver<ClockSnapshot>,
    run_join: JoinHandle<()>,
    _heartbeat: HeartbeatSender,
}

#[derive(Debug)]
enum LocalCommand {
    Start {
        time1: Duration,
        time2: Duration,
        active_player: Player,
    },
}

impl AuthoritativeClock {
    /// Spawns the clock on `handle`'s channel. The returned receiver yields
    /// [`ClockEvent`]s for the duel logic; the same events also go out on
    /// the wire for the Master side.
    pub fn new(
        handle: BusHandle,
        store: SnapshotStore,
    ) -> (Self, mpsc::UnboundedReceiver<ClockEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClockSnapshot::default());
        let bus_rx = handle.subscribe();

        let mut heartbeat = HeartbeatSender::new(handle.clone());
        heartbeat.start();

        let runner = ClockRunner {
            clock: DuelClock::new(Instant::now()),
            handle,
            store,
            state_tx,
            event_tx,
            broadcasts_since_save: 0,
        };
        let run_join = tokio::spawn(runner.run_loop(bus_rx, cmd_rx));

        (
            Self {
                cmd_tx,
                state_rx,
                run_join,
                _heartbeat: heartbeat,
            },
            event_rx,
        )
    }

    /// Manual resume entry point, bypassing the command protocol: behaves
    /// exactly like receiving `TIMER_START`. Used when the Audience context
    /// opens mid-duel and resumes from a persisted snapshot.
    pub fn start_timer(&self, time1: Duration, time2: Duration, active_player: Player) {
        let command = LocalCommand::Start {
            time1,
            time2,
            active_player,
        };
        if self.cmd_tx.send(command).is_err() {
            warn!("clock task is gone, ignoring local start");
        }
    }

    /// Current clock state for the Audience display.
    pub fn watch_state(&self) -> watch::Receiver<ClockSnapshot> {
        self.state_rx.clone()
    }
}

impl Drop for AuthoritativeClock {
    fn drop(&mut self) {
        self.run_join.abort();
    }
}

#[derive(Debug)]
struct ClockRunner {
    clock: DuelClock,
    handle: BusHandle,
    store: SnapshotStore,
    state_tx: watch::Sender<ClockSnapshot>,
    event_tx: mpsc::UnboundedSender<ClockEvent>,
    broadcasts_since_save: u32,
}

impl ClockRunner {
    async fn run_loop(
        mut self,
        mut bus_rx: mpsc::UnboundedReceiver<TimerMessage>,
        mut cmd_rx: mpsc::UnboundedReceiver<LocalCommand>,
    ) {
        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast = interval(TICK_INTERVAL);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Recomputed every iteration: clearing the skip sub-state is all
            // it takes to cancel a pending completion
            let skip_end = match self.clock.skip_deadline() {
                Some(deadline) => SkipEnd::Time(Box::pin(sleep_until(deadline))),
                None => SkipEnd::Never(std::future::pending()),
            };

            // Tie-break when several timers are due at the same instant:
            // countdown tick, then skip completion, then broadcast
            select! {
                biased;
                _ = tick.tick(), if self.clock.is_running() => {
                    let event = self.clock.tick(Instant::now());
                    self.publish_state();
                    if let Some(event) = event {
                        self.emit(event);
                    }
                }
                _ = skip_end => {
                    let event = self.clock.complete_skip(Instant::now());
                    self.publish_state();
                    if let Some(event) = event {
                        self.emit(event);
                    }
                }
                _ = broadcast.tick(), if self.clock.is_running() => {
                    self.broadcast_update();
                }
                message = bus_rx.recv() => {
                    match message {
                        Some(message) => {
                            if self.handle_message(message) {
                                tick.reset();
                                broadcast.reset();
                            }
                            self.publish_state();
                        }
                        None => break,
                    }
                }
                command = cmd_rx.recv() => {
                    match command {
                        Some(LocalCommand::Start { time1, time2, active_player }) => {
                            self.clock.apply_start(time1, time2, active_player, Instant::now());
                            tick.reset();
                            broadcast.reset();
                            self.publish_state();
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Applies one wire message. Returns true when the countdown was
    /// (re)started, which calls for fresh tick intervals.
    fn handle_message(&mut self, message: TimerMessage) -> bool {
        let now = Instant::now();
        match message {
            TimerMessage::TimerStart {
                player1_time,
                player2_time,
                active_player,
            } => {
                self.clock
                    .apply_start(secs(player1_time), secs(player2_time), active_player, now);
                true
            }
            TimerMessage::TimerPause => {
                self.clock.pause();
                false
            }
            TimerMessage::TimerResume { active_player } => {
                self.clock.resume(active_player, now);
                true
            }
            TimerMessage::TimerSwitch { active_player } => {
                self.clock.switch(active_player, now);
                false
            }
            TimerMessage::SkipStart {
                answer,
                // Carried on the wire for display use; the skip does not
                // change whose time is decreasing
                active_player: _,
            } => {
                self.clock.start_skip(answer, now);
                false
            }
            TimerMessage::DuelEnd => {
                self.clock.end_duel();
                self.store.clear();
                false
            }
            TimerMessage::MasterPing => {
                self.handle.send(&TimerMessage::AudienceHeartbeat);
                false
            }
            other => {
                debug!("ignoring non-command message: {other:?}");
                false
            }
        }
    }

    fn emit(&mut self, event: ClockEvent) {
        let message = match event {
            ClockEvent::PlayerTimeout { loser } => TimerMessage::PlayerTimeout { loser },
            ClockEvent::SkipEnd { switch_to } => TimerMessage::SkipEnd {
                switch_to_player: switch_to,
            },
        };
        self.handle.send(&message);
        if self.event_tx.send(event).is_err() {
            debug!("no local listener for clock events");
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.clock.snapshot());
    }

    fn broadcast_update(&mut self) {
        self.handle.send(&TimerMessage::TimerUpdate {
            time1: self.clock.time1().as_secs_f64(),
            time2: self.clock.time2().as_secs_f64(),
            active_player: self.clock.active_player(),
            timestamp: unix_millis(),
        });

        self.broadcasts_since_save += 1;
        if self.broadcasts_since_save >= SNAPSHOT_PERIOD_BROADCASTS {
            self.broadcasts_since_save = 0;
            self.store.save(&TimerSnapshot::new(
                self.clock.time1(),
                self.clock.time2(),
                self.clock.active_player(),
            ));
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

enum SkipEnd {
    Never(std::future::Pending<()>),
    Time(Pin<Box<tokio::time::Sleep>>),
}

impl Future for SkipEnd {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match *self {
            Self::Never(ref mut pend) => Pin::new(pend).poll(cx),
            Self::Time(ref mut slp) => slp.as_mut().poll(cx),
        }
    }
}
