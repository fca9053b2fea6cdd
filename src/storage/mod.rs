//! Persistence layer.
//!
//! The engine hands full `GameState` snapshots to a `StateStore` after
//! every change and reads one back at start-up. `JsonFileStore` keeps the
//! snapshot in a pretty-printed JSON file; `MemoryStore` keeps the same
//! serialised blob in memory for tables that should not outlive the
//! process.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::{GameState, LedgerError};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "scorekeeper_state.json";

/// Loads and saves whole-table snapshots.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore: Send {
    /// The saved snapshot, or `None` on first run.
    fn load(&self) -> Result<Option<GameState>, LedgerError>;

    /// Replace the saved snapshot.
    fn save(&self, state: &GameState) -> Result<(), LedgerError>;
}

fn persistence_error(err: anyhow::Error) -> LedgerError {
    LedgerError::Persistence(format!("{err:#}"))
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Snapshot stored as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<GameState>> {
        let path = self.path.display();
        if !self.path.exists() {
            info!(%path, "No saved state found, starting fresh");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state from {path}"))?;
        let state: GameState = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {path}"))?;

        info!(
            %path,
            round = state.round,
            players = state.players.len(),
            loans = state.loans.len(),
            "State loaded from disk"
        );
        Ok(Some(state))
    }

    fn write(&self, state: &GameState) -> Result<()> {
        let path = self.path.display();
        let json = serde_json::to_string_pretty(state).context("Failed to serialise game state")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state to {path}"))?;

        debug!(%path, round = state.round, "State saved");
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<GameState>, LedgerError> {
        self.read().map_err(persistence_error)
    }

    fn save(&self, state: &GameState) -> Result<(), LedgerError> {
        self.write(state).map_err(persistence_error)
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// Snapshot kept as a serialised blob in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStore {
    /// A store that already holds `state`, as if saved by an earlier run.
    pub fn with_state(state: &GameState) -> Result<Self, LedgerError> {
        let store = Self::default();
        store.save(state)?;
        Ok(store)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<GameState>, LedgerError> {
        let blob = self
            .blob
            .lock()
            .map_err(|_| LedgerError::Persistence("memory store lock poisoned".into()))?;
        blob.as_deref()
            .map(|json| serde_json::from_str(json).context("Failed to parse stored state"))
            .transpose()
            .map_err(persistence_error)
    }

    fn save(&self, state: &GameState) -> Result<(), LedgerError> {
        let json = serde_json::to_string(state)
            .context("Failed to serialise game state")
            .map_err(persistence_error)?;
        let mut blob = self
            .blob
            .lock()
            .map_err(|_| LedgerError::Persistence("memory store lock poisoned".into()))?;
        *blob = Some(json);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
