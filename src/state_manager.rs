// State Manager for Live Trading
// JSON file persistence with atomic replace
//
// Holds the grid state of the one basket this process manages and keeps it
// on disk so a restart resumes where the previous run stopped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::Direction;

// =============================================================================
// Data Models
// =============================================================================

/// Progress of the current basket
///
/// `direction == None` iff `levels_filled == 0` iff `next_entry_price == None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridState {
    pub direction: Option<Direction>,
    pub last_entry_price: Option<f64>,
    pub next_entry_price: Option<f64>,
    pub levels_filled: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// `YYMMDDHHMMSS` of the first fill, 0 when no basket is identified
    pub basket_id: u64,
    pub basket_start_balance: Option<f64>,
    pub max_volume: f64,
    /// Most negative unrealized pnl / notional, never above zero
    pub worst_drawdown: f64,
    pub basket_open_ts: Option<DateTime<Utc>>,
    pub entry_order_ids: Vec<u64>,
    pub tp_order_ids: Vec<u64>,
}

impl GridState {
    /// Back to the empty, flat value
    pub fn reset(&mut self) {
        *self = GridState::default();
    }

    pub fn is_active(&self) -> bool {
        self.direction.is_some()
    }

    pub fn cooldown_active(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Record an entry order id, keeping first-seen order
    pub fn push_entry_order(&mut self, order_id: u64) {
        if !self.entry_order_ids.contains(&order_id) {
            self.entry_order_ids.push(order_id);
        }
    }

    pub fn push_tp_order(&mut self, order_id: u64) {
        if !self.tp_order_ids.contains(&order_id) {
            self.tp_order_ids.push(order_id);
        }
    }

    /// Fold a position observation into the running peaks
    ///
    /// Returns true when either peak moved.
    pub fn track_exposure(&mut self, abs_qty: f64, drawdown: f64) -> bool {
        let mut changed = false;
        if drawdown < self.worst_drawdown {
            self.worst_drawdown = drawdown;
            changed = true;
        }
        if abs_qty > self.max_volume {
            self.max_volume = abs_qty;
            changed = true;
        }
        changed
    }
}

/// Basket id for a first-fill time: `YYMMDDHHMMSS` as an integer
pub fn basket_id_for(time: DateTime<Utc>) -> u64 {
    time.format("%y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_default()
}

// =============================================================================
// State Store Implementation
// =============================================================================

/// Crash-safe JSON store for [`GridState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create state directory: {}", parent.display())
                })?;
            }
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the saved state; any read or parse failure yields a fresh state
    pub fn load(&self) -> GridState {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return GridState::default();
            }
            Err(e) => {
                warn!(
                    "Could not read state file {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                return GridState::default();
            }
        };

        match serde_json::from_str::<GridState>(&contents) {
            Ok(state) => {
                if state.is_active() {
                    info!(
                        "Loaded state: basket #{} {} levels={} next_entry={:?}",
                        state.basket_id,
                        state.direction.map(|d| d.to_string()).unwrap_or_default(),
                        state.levels_filled,
                        state.next_entry_price
                    );
                }
                state
            }
            Err(e) => {
                warn!(
                    "Corrupt state file {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                GridState::default()
            }
        }
    }

    /// Write to a sibling temp file, fsync, then rename over the real path
    pub fn save(&self, state: &GridState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        let tmp_path = self.tmp_path();

        {
            let mut file = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to move {} over {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;
        self.sync_dir()?;

        debug!("State saved to: {}", self.path.display());
        Ok(())
    }

    /// Directory holding the state file; `.` for a bare file name
    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Flush the directory entry so a completed rename survives power loss
    #[cfg(unix)]
    fn sync_dir(&self) -> Result<()> {
        let dir = self.dir();
        File::open(&dir)
            .and_then(|d| d.sync_all())
            .with_context(|| format!("Failed to sync state directory {}", dir.display()))
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<()> {
        Ok(())
    }
}
