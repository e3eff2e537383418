/// Configuration and utility functions for undo managers.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Transition speed in progress units per second.
const DEFAULT_UNDO_RATE: f32 = 3.0;

/// Factor applied to the rate on each repeated same-direction execute.
const DEFAULT_UNDO_SPEEDUP: f32 = 2.0;

/// Smallest capacity allowed together with `CapacityPolicy::EvictOldest`.
const MIN_EVICTING_CAPACITY: usize = 2;

/// What a push does when the stack is already at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// The push fails and nothing changes.
    #[default]
    Reject,
    /// The oldest snapshots are dropped to make room.
    EvictOldest,
}

/// Tuning for one `UndoManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Initial transition rate (progress per second).
    pub undo_rate: f32,
    /// Rate multiplier for each repeated execute in the same direction.
    pub undo_speedup: f32,
    /// Maximum number of snapshots per stack. `None` = unbounded.
    pub capacity: Option<usize>,
    pub capacity_policy: CapacityPolicy,
    /// Push an initial snapshot on `start` when the stack is empty.
    pub initialize_stack: bool,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            undo_rate: DEFAULT_UNDO_RATE,
            undo_speedup: DEFAULT_UNDO_SPEEDUP,
            capacity: None,
            capacity_policy: CapacityPolicy::Reject,
            initialize_stack: true,
        }
    }
}

impl UndoConfig {
    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (parse error, unreadable file, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<UndoConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse undo config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read undo config at {}: {e}", path.display());
                }
            }
            // Return defaults on error (don't overwrite broken file)
            Self::default()
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!(
                    "Failed to create default undo config at {}: {e}",
                    path.display()
                );
            }
            config
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Replaces out-of-range values with usable ones.
    pub fn sanitize(&mut self) {
        if !(self.undo_rate.is_finite() && self.undo_rate > 0.0) {
            self.undo_rate = DEFAULT_UNDO_RATE;
        }
        if !(self.undo_speedup.is_finite() && self.undo_speedup > 0.0) {
            self.undo_speedup = DEFAULT_UNDO_SPEEDUP;
        }
        if self.capacity_policy == CapacityPolicy::EvictOldest {
            if let Some(capacity) = self.capacity.as_mut() {
                *capacity = (*capacity).max(MIN_EVICTING_CAPACITY);
            }
        }
    }
}

/// Resolves the data directory path.
///
/// Resolution order:
/// 1. `DYNUNDO_DATA_DIR` environment variable
/// 2. `.data/` directory next to the executable
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DYNUNDO_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(".data")
}

/// Builds the store key for a manager called `name`.
pub fn stack_key(name: &str) -> String {
    format!("undo/{name}")
}
