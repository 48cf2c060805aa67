// Durable position state, one record per (symbol, timeframe).
//
// The file store keeps each record as a small pretty-printed JSON document
// so an operator can inspect or repair it while the process is down.
// Precondition: at most one live process per (symbol, timeframe) pair.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a position is currently open and how large it is.
///
/// Invariant: `in_position == (last_amount > 0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub in_position: bool,
    pub last_amount: f64,
}

impl PositionState {
    pub fn flat() -> Self {
        Self {
            in_position: false,
            last_amount: 0.0,
        }
    }

    pub fn open(amount: f64) -> Self {
        Self {
            in_position: true,
            last_amount: amount,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.in_position == (self.last_amount > 0.0)
    }
}

impl Default for PositionState {
    fn default() -> Self {
        Self::flat()
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence capability for position state.
///
/// `load` never fails on a missing record; it returns the zero state so the
/// first tick of a fresh pair starts flat. `save` replaces the whole record
/// atomically from the reader's perspective.
pub trait StateStore: Send + Sync {
    fn load(&self, symbol: &str, timeframe: &str) -> Result<PositionState, StorageError>;
    fn save(
        &self,
        symbol: &str,
        timeframe: &str,
        state: &PositionState,
    ) -> Result<(), StorageError>;
}

/// Filesystem-safe key for a symbol, e.g. "BTC/USDT:USDT" -> "btc-usdt-usdt"
pub fn symbol_slug(symbol: &str) -> String {
    symbol.to_lowercase().replace(['/', ':'], "-")
}

/// One JSON file per (symbol, timeframe) under a state directory.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create the store, creating the directory if needed. Failure here is
    /// fatal to startup: a run whose state cannot be recorded must not trade.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", symbol_slug(symbol), timeframe))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, symbol: &str, timeframe: &str) -> Result<PositionState, StorageError> {
        let path = self.record_path(symbol, timeframe);
        if !path.exists() {
            return Ok(PositionState::flat());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(
        &self,
        symbol: &str,
        timeframe: &str,
        state: &PositionState,
    ) -> Result<(), StorageError> {
        let path = self.record_path(symbol, timeframe);
        let tmp = tmp_path(&path);
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, raw)?;
        // rename within the same directory, so readers see old or new, never half
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// In-memory store for tests and throwaway paper runs.
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<(String, String), PositionState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, symbol: &str, timeframe: &str) -> Result<PositionState, StorageError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_else(PositionState::flat))
    }

    fn save(
        &self,
        symbol: &str,
        timeframe: &str,
        state: &PositionState,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap();
        records.insert(
            (symbol.to_string(), timeframe.to_string()),
            state.clone(),
        );
        Ok(())
    }
}
