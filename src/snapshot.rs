use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, io::ErrorKind, path::PathBuf};
use tokio::time::Duration;

use crate::message::{Player, unix_millis};

pub const SNAPSHOT_FILE_NAME: &str = "timer-state.json";

/// Periodic durable copy of the clock, written roughly once per second while
/// the countdown runs so a reloaded Audience context can approximately
/// resume. `lastUpdate` is Unix milliseconds, kept for staleness detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    #[serde(rename = "timeRemaining1")]
    pub time_remaining_1: f64,
    #[serde(rename = "timeRemaining2")]
    pub time_remaining_2: f64,
    #[serde(rename = "activePlayer")]
    pub active_player: Player,
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
}

impl TimerSnapshot {
    pub fn new(time1: Duration, time2: Duration, active_player: Player) -> Self {
        Self {
            time_remaining_1: time1.as_secs_f64(),
            time_remaining_2: time2.as_secs_f64(),
            active_player,
            last_update: unix_millis(),
        }
    }

    pub fn time1(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_remaining_1).unwrap_or_default()
    }

    pub fn time2(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_remaining_2).unwrap_or_default()
    }

    /// Whether this snapshot is older than `max_age`. Resuming from a fresh
    /// snapshot loses up to about one second of countdown; resuming from a
    /// stale one would silently rewind a duel, so callers should check.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age_ms = unix_millis().saturating_sub(self.last_update);
        age_ms < 0 || age_ms as u128 > max_age.as_millis()
    }
}

/// Best-effort local persistence for [`TimerSnapshot`]s. Every operation
/// logs failures instead of returning them; losing a snapshot degrades
/// reload recovery, never a live duel.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A store that never persists anything, for contexts without usable
    /// storage.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Store in the platform-local data directory, or disabled if none can
    /// be found.
    pub fn default_location() -> Self {
        match directories::BaseDirs::new() {
            Some(dirs) => {
                let mut path = dirs.data_local_dir().to_path_buf();
                path.push("duelbox");
                path.push(SNAPSHOT_FILE_NAME);
                Self::new(path)
            }
            None => {
                warn!("could not find a data directory, timer snapshots disabled");
                Self::disabled()
            }
        }
    }

    pub fn save(&self, snapshot: &TimerSnapshot) {
        let Some(path) = &self.path else { return };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(snapshot).map_err(std::io::Error::other)?;
            fs::write(path, json)
        };
        if let Err(e) = write() {
            warn!("failed to save timer snapshot to {}: {e}", path.display());
        }
    }

    pub fn load(&self) -> Option<TimerSnapshot> {
        let path = self.path.as_ref()?;
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read timer snapshot from {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("discarding unreadable timer snapshot: {e}");
                None
            }
        }
    }

    pub fn clear(&self) {
        let Some(path) = &self.path else { return };
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to clear timer snapshot at {}: {e}", path.display());
            }
        }
    }
}
