//! Eye-closure state machine
//!
//! Turns per-frame eye landmarks into a normalized openness ratio and a
//! debounced open/closed state. The open/closed EAR bounds used for
//! normalization recalibrate themselves from the extremes observed during
//! each rolling calibration window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::config::{secs, EyeConfig};
use crate::signals::{eye_aspect_ratio, FaceLandmarks};

/// Minimum divisor when normalizing against the calibrated range
const MIN_EAR_RANGE: f64 = 1e-6;

/// Fixed-capacity FIFO window
#[derive(Debug, Clone)]
struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

/// Result of one `update`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeReading {
    pub eyes_closed: bool,
    /// Normalized openness in [0, 1]
    pub openness: f64,
    /// Raw averaged EAR of this frame
    pub ear: f64,
    /// Time spent in the current closed state (zero when open)
    pub closed_for: Duration,
}

/// Per-session eye state
#[derive(Debug, Clone)]
pub struct EyeState {
    pub openness_ratio: f64,
    pub closed: bool,
    pub closed_since: Option<Instant>,
    pub calibration_min: f64,
    pub calibration_max: f64,
    pub open_threshold: f64,
    pub closed_threshold: f64,
    recent_samples: Window<f64>,
    recent_closed_flags: Window<bool>,
    calibration_started: Option<Instant>,
}

impl EyeState {
    fn new(config: &EyeConfig) -> Self {
        Self {
            openness_ratio: 1.0,
            closed: false,
            closed_since: None,
            calibration_min: config.initial_min_ear,
            calibration_max: config.initial_max_ear,
            open_threshold: config.initial_open_threshold,
            closed_threshold: config.initial_closed_threshold,
            recent_samples: Window::new(config.ear_window),
            recent_closed_flags: Window::new(config.closed_window),
            calibration_started: None,
        }
    }
}

/// Eye-closure detector with self-calibration and hysteresis
#[derive(Debug, Clone)]
pub struct EyeClosureMachine {
    config: EyeConfig,
    state: EyeState,
}

impl EyeClosureMachine {
    pub fn new(config: EyeConfig) -> Self {
        Self {
            state: EyeState::new(&config),
            config,
        }
    }

    pub fn state(&self) -> &EyeState {
        &self.state
    }

    /// Feed one face. Returns `None` when the landmarks are unusable, which
    /// callers treat the same as no face at all.
    pub fn update(&mut self, face: &FaceLandmarks, now: Instant) -> Option<EyeReading> {
        let left = eye_aspect_ratio(&face.left_eye)?;
        let right = eye_aspect_ratio(&face.right_eye)?;
        let ear = (left + right) / 2.0;

        self.calibrate(ear, now);

        let state = &mut self.state;
        state.recent_samples.push(ear);
        let ear_smooth =
            state.recent_samples.iter().sum::<f64>() / state.recent_samples.len() as f64;

        let range = (state.open_threshold - state.closed_threshold).max(MIN_EAR_RANGE);
        state.openness_ratio = ((ear_smooth - state.closed_threshold) / range).clamp(0.0, 1.0);

        state
            .recent_closed_flags
            .push(state.openness_ratio < self.config.closed_openness);
        let closed_frames = state.recent_closed_flags.iter().filter(|&&c| c).count();
        let closed_ratio = closed_frames as f64 / state.recent_closed_flags.len() as f64;

        if closed_ratio > self.config.closed_ratio_trigger {
            if !state.closed {
                debug!("Eyes closed (closed ratio {:.2})", closed_ratio);
                state.closed_since = Some(now);
            }
            state.closed = true;
        } else if state.closed {
            let debounce = secs(self.config.reopen_debounce_secs);
            let held = state
                .closed_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or(debounce);
            if held >= debounce {
                debug!("Eyes reopened after {:.2}s", held.as_secs_f64());
                state.closed = false;
                state.closed_since = None;
            }
        }

        Some(EyeReading {
            eyes_closed: state.closed,
            openness: state.openness_ratio,
            ear,
            closed_for: self.closed_for(now),
        })
    }

    /// Time spent in the current closed state
    pub fn closed_for(&self, now: Instant) -> Duration {
        match (self.state.closed, self.state.closed_since) {
            (true, Some(since)) => now.saturating_duration_since(since),
            _ => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.state = EyeState::new(&self.config);
    }

    fn calibrate(&mut self, ear: f64, now: Instant) {
        let window = secs(self.config.calibration_window_secs);
        let state = &mut self.state;
        let started = *state.calibration_started.get_or_insert(now);

        if now.saturating_duration_since(started) < window {
            state.calibration_min = state.calibration_min.min(ear);
            state.calibration_max = state.calibration_max.max(ear);
            return;
        }

        let spread = state.calibration_max - state.calibration_min;
        if spread > self.config.min_calibration_spread {
            state.closed_threshold = state.calibration_min * self.config.closed_threshold_scale;
            state.open_threshold = state.calibration_max;
            debug!(
                "Recalibrated EAR thresholds: closed {:.3}, open {:.3}",
                state.closed_threshold, state.open_threshold
            );
        } else {
            debug!("Calibration spread {:.3} too small, keeping thresholds", spread);
        }

        // Next window starts from this sample
        state.calibration_started = Some(now);
        state.calibration_min = ear;
        state.calibration_max = ear;
    }
}
