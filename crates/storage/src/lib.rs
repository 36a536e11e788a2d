//! Storage Layer
//!
//! The published focus snapshot and its on-disk JSON mirror.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotFile};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Persisted snapshot is corrupt: {0}")]
    CorruptPersistedState(#[from] serde_json::Error),
}
