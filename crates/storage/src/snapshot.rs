//! Snapshot model and file mirror

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StorageError;

/// Latest published focus state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub focus_score: f64,
    pub distractions: u64,
    pub active: bool,
    /// Seconds since the Unix epoch; absent on the default snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Snapshot {
    /// Snapshot stamped with the current wall-clock time
    pub fn now(focus_score: f64, distractions: u64, active: bool) -> Self {
        let now = chrono::Utc::now();
        Self {
            focus_score: round1(focus_score),
            distractions,
            active,
            timestamp: Some(now.timestamp_millis() as f64 / 1000.0),
        }
    }

    /// Same values, marked inactive
    pub fn deactivated(self) -> Self {
        Self {
            active: false,
            ..self
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// JSON mirror of the latest snapshot at a well-known path
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file wholesale
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// see either the old or the new contents.
    pub fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let body = serde_json::to_vec(snapshot).map_err(|e| self.io_error(e.into()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Mirrored snapshot to {}", self.path.display());
        Ok(())
    }

    pub fn read(&self) -> Result<Snapshot, StorageError> {
        let body = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read the mirror, falling back to the zero-valued default
    pub fn read_or_default(&self) -> Snapshot {
        match self.read() {
            Ok(snapshot) => snapshot,
            Err(StorageError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Snapshot::default()
            }
            Err(e) => {
                warn!("Using default snapshot: {}", e);
                Snapshot::default()
            }
        }
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
