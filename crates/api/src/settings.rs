//! Layered application settings
//!
//! Defaults, then an optional TOML file, then `FOCUS__*` environment
//! variables (`FOCUS__SERVER__PORT=9000`, `FOCUS__SESSION__PUBLISH_INTERVAL_MS=500`).

use std::path::{Path, PathBuf};

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use focus_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use session::SessionConfig;

/// Default settings file, overridable with `FOCUS_CONFIG`
pub const DEFAULT_CONFIG_FILE: &str = "focus-tracker.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub camera: CameraConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load from `FOCUS_CONFIG` (or the default file) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("FOCUS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("FOCUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings
            .engine
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::CameraSource;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.session.publish_interval_ms, 1000);
        assert_eq!(settings.alerts.cooldown_seconds, 30);
        assert_eq!(
            settings.camera.source,
            CameraSource::Device {
                path: PathBuf::from("/dev/video0")
            }
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus-tracker.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[logging]
json = true

[camera]
width = 320
height = 240

[camera.source]
kind = "replay"
dir = "/tmp/frames"

[engine.score]
counting = "rising_edge"

[session]
snapshot_path = "/tmp/focus.json"
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.logging.json);
        assert_eq!(settings.camera.width, 320);
        assert_eq!(
            settings.camera.source,
            CameraSource::Replay {
                dir: PathBuf::from("/tmp/frames"),
                looped: true
            }
        );
        assert_eq!(
            settings.engine.score.counting,
            focus_engine::DistractionCounting::RisingEdge
        );
        assert_eq!(settings.session.snapshot_path, PathBuf::from("/tmp/focus.json"));
        assert_eq!(settings.session.frame_interval_ms, 20);
    }

    #[test]
    fn test_invalid_engine_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus-tracker.toml");
        std::fs::write(&path, "[engine.eye]\ncalibration_window_secs = -5.0\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("eye.calibration_window_secs"));
    }
}
