//! Per-frame analysis results and distraction causes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the user was flagged as distracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionCause {
    /// Eyes closed
    Drowsy,

    /// Phone in view
    MobileDetected,

    /// Pen in view but not moving for too long
    Inactivity,
}

impl DistractionCause {
    /// Short stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            DistractionCause::Drowsy => "drowsy",
            DistractionCause::MobileDetected => "mobile",
            DistractionCause::Inactivity => "inactivity",
        }
    }

    /// Notification title
    pub fn title(&self) -> &'static str {
        match self {
            DistractionCause::Drowsy => "Drowsiness Alert",
            DistractionCause::MobileDetected => "Distraction Alert",
            DistractionCause::Inactivity => "Break Alert",
        }
    }

    /// Notification body
    pub fn message(&self) -> &'static str {
        match self {
            DistractionCause::Drowsy => "Eyes closed too long. Take a break!",
            DistractionCause::MobileDetected => "Mobile detected! Stay focused.",
            DistractionCause::Inactivity => "No writing activity detected.",
        }
    }
}

impl fmt::Display for DistractionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete analysis of one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnalysis {
    pub face_detected: bool,
    pub eyes_closed: bool,
    /// True whenever no usable face was found
    pub looking_away: bool,
    /// Normalized openness; zero when no face
    pub openness: f64,
    pub eyes_closed_for: Duration,
    pub phone_detected: bool,
    pub pen_detected: bool,
    pub pen_idle: Duration,
    /// Value fed into the outer smoothing filter
    pub instantaneous: f64,
    /// Smoothed session score
    pub focus_score: f64,
    pub distractions: u64,
    pub events: Vec<DistractionCause>,
}

impl FrameAnalysis {
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}
