//! Cross-context authoritative countdown synchronization for live
//! two-player duels.
//!
//! Two independent contexts cooperate over a named fire-and-forget broadcast
//! channel with no server in between: the **Audience** context owns the one
//! true clock ([`AuthoritativeClock`]) and is the only thing that ever
//! decrements time, while the **Master** context issues commands and shows a
//! read-only mirror of the last broadcast state ([`TimerController`]).
//! Either side can open, close, or reload at any moment; liveness is
//! detected by heartbeat ([`ConnectionMonitor`]) and the audience persists
//! periodic snapshots ([`SnapshotStore`]) so a reload resumes within about a
//! second of where it left off.
//!
//! ```no_run
//! use duelbox::{AuthoritativeClock, MessageBus, Player, SnapshotStore, TimerController};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = MessageBus::new();
//!
//! // Audience context: owns the clock, broadcasts updates, heartbeats.
//! let (clock, mut clock_events) =
//!     AuthoritativeClock::new(bus.open("duel"), SnapshotStore::default_location());
//!
//! // Master context: commands the clock and mirrors its broadcasts.
//! let (controller, mut events) = TimerController::new(bus.open("duel"));
//! controller.send_start(Duration::from_secs(45), Duration::from_secs(45), Player::One);
//! # let _ = (clock, controller, clock_events.recv().await, events.recv().await);
//! # }
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod connection;
pub mod controller;
pub mod message;
pub mod snapshot;

pub use channel::{BusHandle, MessageBus};
pub use clock::{
    AuthoritativeClock, ClockEvent, ClockSnapshot, DuelClock, SKIP_DURATION,
    SNAPSHOT_PERIOD_BROADCASTS, SkipAnimation, TICK_INTERVAL,
};
pub use config::{Config, DEFAULT_CHANNEL};
pub use connection::{CONNECTION_TIMEOUT, ConnectionMonitor, HEARTBEAT_INTERVAL, HeartbeatSender};
pub use controller::{ControllerEvent, MirrorState, TimerController};
pub use message::{Player, ProtocolError, TimerMessage};
pub use snapshot::{SnapshotStore, TimerSnapshot};
