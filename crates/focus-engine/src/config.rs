//! Focus engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tuning value outside its usable range
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid engine setting {field} = {value}: {reason}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub value: f64,
    pub reason: &'static str,
}

/// Seconds from configuration as a `Duration`; unusable values become zero
pub(crate) fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn non_negative(field: &'static str, value: f64) -> Result<(), InvalidConfig> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InvalidConfig {
            field,
            value,
            reason: "must be a finite, non-negative number",
        })
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), InvalidConfig> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InvalidConfig {
            field,
            value,
            reason: "must lie in [0, 1]",
        })
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub eye: EyeConfig,
    pub score: ScoreConfig,
    pub objects: ObjectConfig,
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        non_negative("eye.calibration_window_secs", self.eye.calibration_window_secs)?;
        non_negative("eye.reopen_debounce_secs", self.eye.reopen_debounce_secs)?;
        fraction("eye.closed_ratio_trigger", self.eye.closed_ratio_trigger)?;
        non_negative("score.long_closure_secs", self.score.long_closure_secs)?;
        non_negative("score.inactivity_secs", self.score.inactivity_secs)?;
        fraction("score.eye_alpha", self.score.eye_alpha)?;
        fraction("score.outer_retain", self.score.outer_retain)?;
        non_negative("score.phone_penalty", self.score.phone_penalty)?;
        Ok(())
    }
}

/// Eye-closure state machine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Length of one rolling calibration window (seconds)
    pub calibration_window_secs: f64,

    /// Minimum observed EAR spread required to accept a recalibration
    pub min_calibration_spread: f64,

    /// Closed threshold = calibrated minimum * this factor
    pub closed_threshold_scale: f64,

    /// Pre-seeded calibration bounds
    pub initial_min_ear: f64,
    pub initial_max_ear: f64,
    pub initial_closed_threshold: f64,
    pub initial_open_threshold: f64,

    /// EAR smoothing window (frames)
    pub ear_window: usize,

    /// Closed-flag hysteresis window (frames)
    pub closed_window: usize,

    /// Openness below this marks a frame as closed
    pub closed_openness: f64,

    /// Fraction of closed frames required to enter the closed state
    pub closed_ratio_trigger: f64,

    /// Minimum time the closed state is held before reopening (seconds)
    pub reopen_debounce_secs: f64,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            calibration_window_secs: 5.0,
            min_calibration_spread: 0.05,
            closed_threshold_scale: 1.15,
            initial_min_ear: 0.08,
            initial_max_ear: 0.35,
            initial_closed_threshold: 0.18,
            initial_open_threshold: 0.30,
            ear_window: 5,
            closed_window: 10,
            closed_openness: 0.25,
            closed_ratio_trigger: 0.7,
            reopen_debounce_secs: 1.0,
        }
    }
}

/// How the distraction counter reacts to a sustained phone sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionCounting {
    /// Every frame with a phone in view counts
    #[default]
    PerFrame,
    /// Only the frame where a phone first appears counts
    RisingEdge,
}

/// Score fusion and smoothing tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Eyes closed longer than this drop the eye score to 25 (seconds)
    pub long_closure_secs: f64,

    /// Weight of the new target in the eye-score filter
    pub eye_alpha: f64,

    /// Weight of the previous value in the outer filter
    pub outer_retain: f64,

    /// Flat penalty applied while a phone is in view
    pub phone_penalty: f64,

    /// Pen idle time that raises an inactivity event (seconds)
    pub inactivity_secs: f64,

    pub counting: DistractionCounting,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            long_closure_secs: 120.0,
            eye_alpha: 0.1,
            outer_retain: 0.85,
            phone_penalty: 20.0,
            inactivity_secs: 300.0,
            counting: DistractionCounting::PerFrame,
        }
    }
}

/// Object detection post-filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Detections below this confidence are ignored
    pub min_confidence: f32,

    /// Label fragments that identify a phone (case-insensitive)
    pub phone_labels: Vec<String>,

    /// Label fragments that identify a writing implement
    pub pen_labels: Vec<String>,

    /// Phone boxes smaller than this on both sides are ignored (pixels)
    pub min_phone_box_px: f32,

    /// Pen centre movement that counts as writing activity (pixels)
    pub pen_motion_px: f32,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            phone_labels: vec!["cell phone".to_string(), "mobile".to_string()],
            pen_labels: vec!["pen".to_string()],
            min_phone_box_px: 80.0,
            pen_motion_px: 12.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_negative_and_nan_durations() {
        let mut config = EngineConfig::default();
        config.eye.calibration_window_secs = -5.0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "eye.calibration_window_secs");

        let mut config = EngineConfig::default();
        config.eye.reopen_debounce_secs = f64::NAN;
        assert_eq!(config.validate().unwrap_err().field, "eye.reopen_debounce_secs");

        let mut config = EngineConfig::default();
        config.score.outer_retain = 1.5;
        assert_eq!(config.validate().unwrap_err().field, "score.outer_retain");
    }

    #[test]
    fn test_secs_never_panics() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::ZERO);
    }
}
