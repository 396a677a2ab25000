use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::snapshot::SnapshotStore;

pub const DEFAULT_CHANNEL: &str = "duel-timer-sync";

/// Per-deployment settings. The protocol timing constants are deliberately
/// not configurable; both contexts must agree on them for the wire protocol
/// to interoperate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Logical channel name both contexts open.
    pub channel: String,
    /// Where the audience persists timer snapshots; `None` selects the
    /// platform default location.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            snapshot_path: None,
        }
    }
}

impl Config {
    pub fn snapshot_store(&self) -> SnapshotStore {
        match &self.snapshot_path {
            Some(path) => SnapshotStore::new(path.clone()),
            None => SnapshotStore::default_location(),
        }
    }
}
