//! # Mode Controller
//!
//! The two-state machine that gates automation and destructive actions.
//! AUTO lets the scheduler push snapshots; MANUAL stops it and unlocks
//! deletes. Every transition is written through the [`StateStore`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::store::StateStore;

/// Operational states for the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// The scheduler regenerates and pushes snapshots on its own.
    #[default]
    #[serde(rename = "AUTO")]
    Automated,
    /// The operator drives; destructive actions are allowed.
    #[serde(rename = "MANUAL")]
    Manual,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Automated => "AUTO",
            OperatingMode::Manual => "MANUAL",
        }
    }

    /// Destructive operations (delete) are only permitted in MANUAL.
    pub fn allows_destructive(&self) -> bool {
        matches!(self, OperatingMode::Manual)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO" => Ok(OperatingMode::Automated),
            "MANUAL" => Ok(OperatingMode::Manual),
            other => Err(ModeError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("invalid mode: {0:?} (expected AUTO or MANUAL)")]
    InvalidMode(String),
}

/// Shared, persisted operating mode.
#[derive(Debug)]
pub struct ModeController {
    mode: RwLock<OperatingMode>,
    store: Arc<StateStore>,
}

impl ModeController {
    pub fn new(initial: OperatingMode, store: Arc<StateStore>) -> Self {
        Self {
            mode: RwLock::new(initial),
            store,
        }
    }

    /// Thread-safe access to the current mode.
    pub async fn get(&self) -> OperatingMode {
        *self.mode.read().await
    }

    /// Sets the mode and persists it while still holding the write lock.
    ///
    /// A failed write is logged and the in-memory value is kept.
    pub async fn set(&self, new_mode: OperatingMode) {
        let mut mode = self.mode.write().await;
        if *mode != new_mode {
            log::info!("Transitioning mode: {} -> {}", *mode, new_mode);
        }
        *mode = new_mode;
        if let Err(e) = self.store.record_mode(new_mode) {
            log::error!("Error writing state file: {}", e);
        }
    }

    /// Parses a raw mode value and applies it. Unrecognized values leave the
    /// current mode untouched.
    pub async fn apply(&self, raw: &str) -> Result<OperatingMode, ModeError> {
        let new_mode: OperatingMode = raw.parse()?;
        self.set(new_mode).await;
        Ok(new_mode)
    }
}
