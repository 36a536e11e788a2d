//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Capture loop timing and snapshot mirror location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Snapshot publication cadence
    pub publish_interval_ms: u64,
    /// Pause after each processed frame
    pub frame_interval_ms: u64,
    /// Pause after a failed frame read
    pub read_backoff_ms: u64,
    /// Pause after a failed detection step
    pub adapter_backoff_ms: u64,
    /// Upper bound on how long `stop` waits for the loop
    pub stop_timeout_ms: u64,
    /// JSON mirror of the latest snapshot
    pub snapshot_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 1000,
            frame_interval_ms: 20,
            read_backoff_ms: 10,
            adapter_backoff_ms: 50,
            stop_timeout_ms: 2000,
            snapshot_path: PathBuf::from("focus_data.json"),
        }
    }
}

impl SessionConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    pub fn adapter_backoff(&self) -> Duration {
        Duration::from_millis(self.adapter_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.publish_interval(), Duration::from_secs(1));
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
        assert_eq!(config.snapshot_path, PathBuf::from("focus_data.json"));
    }
}
