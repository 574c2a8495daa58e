use crate::models::Position;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Open positions keyed by asset symbol
pub type Positions = BTreeMap<String, Position>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read positions from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write positions to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("corrupt positions file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode positions: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON file persistence for open positions
///
/// The whole mapping is rewritten on every save. Writes go to a sibling
/// temp file which is then renamed over the target, so a crash mid-write
/// leaves either the old or the new snapshot on disk.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all open positions; a missing file is an empty book
    pub fn load(&self) -> Result<Positions, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No positions file at {}, starting empty", self.path.display());
                return Ok(Positions::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Positions::new());
        }

        let positions: Positions =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(
            "Loaded {} positions from {}",
            positions.len(),
            self.path.display()
        );

        Ok(positions)
    }

    /// Atomically replace the stored snapshot
    pub fn save(&self, positions: &Positions) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(positions)?;
        let tmp_path = self.tmp_path();

        let write = || -> io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(
            "Saved {} positions to {}",
            positions.len(),
            self.path.display()
        );

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "positions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
