//! Focus Scoring Engine
//!
//! Per-frame focus estimation from detector output:
//! - Eye openness and debounced eye closure (self-calibrating)
//! - Phone and pen signals from object detections
//! - Writing inactivity tracking
//! - Fusion into a smoothed 0-100 focus score with a distraction counter

pub mod config;
pub mod events;
pub mod eye;
pub mod score;
pub mod signals;

pub use config::{
    DistractionCounting, EngineConfig, EyeConfig, InvalidConfig, ObjectConfig, ScoreConfig,
};
pub use events::{DistractionCause, FrameAnalysis};
pub use eye::{EyeClosureMachine, EyeReading, EyeState};
pub use score::{BaselineInputs, FocusCalculator, FocusInputs, FocusState, ScoreUpdate};
pub use signals::{
    AdapterError, BoundingBox, Detection, FaceLandmarks, FrameSignals, MockAdapter,
    ObjectClassifier, PenActivityTracker, Point, SignalAdapter,
};

use std::time::{Duration, Instant};

/// Per-session focus engine
///
/// Owns every piece of per-session detection state. One instance lives
/// inside the capture loop and is only touched from there.
pub struct FocusEngine {
    eye: EyeClosureMachine,
    calculator: FocusCalculator,
    classifier: ObjectClassifier,
    pen: PenActivityTracker,
}

impl FocusEngine {
    /// Create a new engine with configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            pen: PenActivityTracker::new(config.objects.pen_motion_px),
            classifier: ObjectClassifier::new(config.objects),
            eye: EyeClosureMachine::new(config.eye),
            calculator: FocusCalculator::new(config.score),
        }
    }

    /// Analyze the detector output of a single frame
    pub fn process(&mut self, signals: &FrameSignals, now: Instant) -> FrameAnalysis {
        let reading = signals
            .face
            .as_ref()
            .and_then(|face| self.eye.update(face, now));

        let objects = self.classifier.classify(&signals.objects);
        let pen = self.pen.observe(objects.pen.as_ref(), now);

        let (face_detected, eyes_closed, openness, eyes_closed_for) = match reading {
            Some(r) => (true, r.eyes_closed, r.openness, r.closed_for),
            None => (false, false, 0.0, Duration::ZERO),
        };

        let update = self.calculator.score(&FocusInputs {
            face_detected,
            eyes_closed,
            eyes_closed_for,
            openness,
            phone_detected: objects.phone_detected,
            pen_detected: pen.detected,
            pen_idle: pen.idle,
        });

        FrameAnalysis {
            face_detected,
            eyes_closed,
            looking_away: !face_detected,
            openness,
            eyes_closed_for,
            phone_detected: objects.phone_detected,
            pen_detected: pen.detected,
            pen_idle: pen.idle,
            instantaneous: update.instantaneous,
            focus_score: update.smoothed,
            distractions: update.distraction_count,
            events: update.events,
        }
    }

    pub fn focus_state(&self) -> FocusState {
        self.calculator.state()
    }

    pub fn eye_state(&self) -> &EyeState {
        self.eye.state()
    }

    /// Reset all state (new session)
    pub fn reset(&mut self) {
        self.eye.reset();
        self.calculator.reset();
        self.pen.reset();
    }
}

impl Default for FocusEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::eye_contour;

    fn face(ear: f64) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: eye_contour(Point::new(100.0, 100.0), 30.0, ear),
            right_eye: eye_contour(Point::new(160.0, 100.0), 30.0, ear),
        }
    }

    fn phone() -> Detection {
        Detection {
            label: "cell phone".into(),
            confidence: 0.9,
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 180.0,
            },
        }
    }

    #[test]
    fn test_no_face_reports_looking_away() {
        let mut engine = FocusEngine::default();
        let analysis = engine.process(&FrameSignals::default(), Instant::now());

        assert!(!analysis.face_detected);
        assert!(!analysis.eyes_closed);
        assert!(analysis.looking_away);
        assert!(analysis.focus_score < 100.0);
    }

    #[test]
    fn test_malformed_face_counts_as_absent() {
        let mut engine = FocusEngine::default();
        let signals = FrameSignals {
            face: Some(FaceLandmarks {
                left_eye: vec![],
                right_eye: vec![],
            }),
            objects: vec![],
        };
        let analysis = engine.process(&signals, Instant::now());
        assert!(!analysis.face_detected);
        assert!(analysis.looking_away);
    }

    #[test]
    fn test_phone_frames_count_and_lower_score() {
        let mut engine = FocusEngine::default();
        let t0 = Instant::now();
        let signals = FrameSignals {
            face: Some(face(0.32)),
            objects: vec![phone()],
        };

        let mut last = None;
        for i in 0..5 {
            last = Some(engine.process(&signals, t0 + Duration::from_millis(33 * i)));
        }
        let last = last.unwrap();

        assert_eq!(last.distractions, 5);
        assert!(last.phone_detected);
        assert!(last.events.contains(&DistractionCause::MobileDetected));
        assert!(last.focus_score < 100.0);
        assert_eq!(engine.focus_state().distraction_count, 5);
    }

    #[test]
    fn test_reset_clears_session_state() {
        let mut engine = FocusEngine::default();
        let t0 = Instant::now();
        for i in 0..20 {
            engine.process(
                &FrameSignals {
                    face: Some(face(0.05)),
                    objects: vec![phone()],
                },
                t0 + Duration::from_millis(50 * i),
            );
        }
        assert!(engine.eye_state().closed);

        engine.reset();
        assert!(!engine.eye_state().closed);
        assert_eq!(engine.focus_state().distraction_count, 0);
        assert_eq!(engine.focus_state().smoothed_score, score::INITIAL_SCORE);
    }
}
