//! Persisted ticket state
//!
//! One JSON document maps each active ticket id to what was last observed
//! for it:
//!
//! ```text
//! {
//!   "100": {
//!     "last_action_number": 2,
//!     "last_action_date": "02/01/2024 08:00",
//!     "status": "Em Andamento",
//!     "last_action": "Segue retorno."
//!   }
//! }
//! ```
//!
//! The document is read once per run and replaced as a whole, atomically,
//! only when the newly computed mapping differs from the loaded one.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lock;

/// Last observation of one active ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_date: Option<String>,

    #[serde(default)]
    pub status: String,

    /// Cached action text, kept for change checks on entries without a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

/// Ticket id to last observation. Sorted so equal states serialize identically.
pub type State = BTreeMap<String, StateEntry>;

/// How the previous state was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No state file yet (first run).
    Missing,
    Loaded,
    /// File existed but could not be read or parsed; treated as empty.
    Corrupt(String),
}

/// Result of loading the state document.
#[derive(Debug, Clone)]
pub struct StateLoad {
    pub state: State,
    pub status: LoadStatus,
}

/// File-backed state document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous state.
    ///
    /// Never fails: a missing file yields an empty state, and an unreadable
    /// or corrupt one yields an empty state plus a logged warning.
    pub fn load(&self) -> StateLoad {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no previous state, starting fresh");
                return StateLoad {
                    state: State::new(),
                    status: LoadStatus::Missing,
                };
            }
            Err(err) => return self.corrupt(format!("read failed: {err}")),
        };

        if content.trim().is_empty() {
            return StateLoad {
                state: State::new(),
                status: LoadStatus::Loaded,
            };
        }

        match serde_json::from_str::<State>(&content) {
            Ok(state) => {
                tracing::info!(path = %self.path.display(), tickets = state.len(), "loaded previous state");
                StateLoad {
                    state,
                    status: LoadStatus::Loaded,
                }
            }
            Err(err) => self.corrupt(format!("invalid JSON: {err}")),
        }
    }

    fn corrupt(&self, reason: String) -> StateLoad {
        tracing::warn!(
            path = %self.path.display(),
            %reason,
            "state file unusable, treating every active ticket as new"
        );
        StateLoad {
            state: State::new(),
            status: LoadStatus::Corrupt(reason),
        }
    }

    /// Replace the persisted document with `state`.
    pub fn save(&self, state: &State) -> Result<()> {
        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');
        lock::write_atomic(&self.path, json.as_bytes())?;
        tracing::info!(path = %self.path.display(), tickets = state.len(), "state saved");
        Ok(())
    }

    /// Save `next` only when it differs from `previous` (deep equality).
    ///
    /// Returns whether a write happened.
    pub fn save_if_changed(&self, previous: &State, next: &State) -> Result<bool> {
        if previous == next {
            tracing::info!("state unchanged, nothing to save");
            return Ok(false);
        }
        self.save(next)?;
        Ok(true)
    }
}
