//! Focus score fusion and smoothing

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{DistractionCounting, ScoreConfig};
use crate::events::DistractionCause;

/// Score every filter starts from at session start
pub const INITIAL_SCORE: f64 = 100.0;

/// Exponential moving average: `value = weight * target + (1 - weight) * value`
#[derive(Debug, Clone, Copy)]
struct Ema {
    weight: f64,
    value: f64,
}

impl Ema {
    fn new(weight: f64) -> Self {
        Self {
            weight,
            value: INITIAL_SCORE,
        }
    }

    fn update(&mut self, target: f64) -> f64 {
        self.value = self.weight * target + (1.0 - self.weight) * self.value;
        self.value
    }

    fn set(&mut self, value: f64) {
        self.value = value;
    }

    fn reset(&mut self) {
        self.value = INITIAL_SCORE;
    }
}

/// Signals fused into one frame's score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusInputs {
    pub face_detected: bool,
    pub eyes_closed: bool,
    pub eyes_closed_for: Duration,
    /// Normalized eye openness; ignored when no face is present
    pub openness: f64,
    pub phone_detected: bool,
    pub pen_detected: bool,
    pub pen_idle: Duration,
}

/// Inputs of the flat weighted baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineInputs {
    pub face_detected: bool,
    pub eyes_closed: bool,
    pub phone_detected: bool,
    pub pen_detected: bool,
}

/// Outcome of scoring one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    /// Eye-state score before the phone penalty
    pub eye_score: f64,
    /// Value fed into the outer filter this frame
    pub instantaneous: f64,
    /// Smoothed session score, always within [0, 100]
    pub smoothed: f64,
    pub distraction_count: u64,
    pub events: Vec<DistractionCause>,
}

/// Per-session focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusState {
    pub smoothed_score: f64,
    pub distraction_count: u64,
}

/// Fuses per-frame signals into the running focus score
#[derive(Debug, Clone)]
pub struct FocusCalculator {
    config: ScoreConfig,
    eye_filter: Ema,
    outer_filter: Ema,
    distraction_count: u64,
    phone_was_present: bool,
}

impl FocusCalculator {
    pub fn new(config: ScoreConfig) -> Self {
        Self {
            eye_filter: Ema::new(config.eye_alpha),
            outer_filter: Ema::new(1.0 - config.outer_retain),
            distraction_count: 0,
            phone_was_present: false,
            config,
        }
    }

    /// Flat weighted score: 100 minus fixed penalties, floored at 0
    pub fn baseline(inputs: &BaselineInputs) -> f64 {
        let mut score: f64 = 100.0;
        if !inputs.face_detected {
            score -= 40.0;
        }
        if inputs.eyes_closed {
            score -= 30.0;
        }
        if inputs.phone_detected {
            score -= 20.0;
        }
        if !inputs.pen_detected {
            score -= 10.0;
        }
        score.clamp(0.0, 100.0)
    }

    pub fn state(&self) -> FocusState {
        FocusState {
            smoothed_score: self.outer_filter.value,
            distraction_count: self.distraction_count,
        }
    }

    pub fn score(&mut self, inputs: &FocusInputs) -> ScoreUpdate {
        let mut events = Vec::new();

        let eye_score = self.eye_score(inputs);
        if inputs.face_detected && inputs.eyes_closed {
            events.push(DistractionCause::Drowsy);
        }

        let mut instantaneous = eye_score;
        if inputs.phone_detected {
            instantaneous -= self.config.phone_penalty;
            let counts = match self.config.counting {
                DistractionCounting::PerFrame => true,
                DistractionCounting::RisingEdge => !self.phone_was_present,
            };
            if counts {
                self.distraction_count += 1;
            }
            events.push(DistractionCause::MobileDetected);
        }
        self.phone_was_present = inputs.phone_detected;

        if inputs.pen_detected && inputs.pen_idle.as_secs_f64() > self.config.inactivity_secs {
            events.push(DistractionCause::Inactivity);
        }

        let smoothed = self.outer_filter.update(instantaneous).clamp(0.0, 100.0);
        self.outer_filter.set(smoothed);

        ScoreUpdate {
            eye_score,
            instantaneous,
            smoothed,
            distraction_count: self.distraction_count,
            events,
        }
    }

    pub fn reset(&mut self) {
        self.eye_filter.reset();
        self.outer_filter.reset();
        self.distraction_count = 0;
        self.phone_was_present = false;
    }

    fn eye_score(&mut self, inputs: &FocusInputs) -> f64 {
        if !inputs.face_detected {
            return self.eye_filter.update(0.0);
        }

        if inputs.eyes_closed {
            // Hard override: bypasses the filter but becomes its new state
            let target = if inputs.eyes_closed_for.as_secs_f64() > self.config.long_closure_secs {
                25.0
            } else {
                50.0
            };
            self.eye_filter.set(target);
            return target;
        }

        let target = if inputs.openness >= 0.9 {
            100.0
        } else if inputs.openness >= 0.4 {
            75.0
        } else {
            50.0
        };
        self.eye_filter.update(target)
    }
}

impl Default for FocusCalculator {
    fn default() -> Self {
        Self::new(ScoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attentive() -> FocusInputs {
        FocusInputs {
            face_detected: true,
            eyes_closed: false,
            eyes_closed_for: Duration::ZERO,
            openness: 1.0,
            phone_detected: false,
            pen_detected: true,
            pen_idle: Duration::ZERO,
        }
    }

    #[test]
    fn test_baseline_worst_case_is_zero() {
        let score = FocusCalculator::baseline(&BaselineInputs {
            face_detected: false,
            eyes_closed: true,
            phone_detected: true,
            pen_detected: false,
        });
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_baseline_best_case_is_hundred() {
        let score = FocusCalculator::baseline(&BaselineInputs {
            face_detected: true,
            eyes_closed: false,
            phone_detected: false,
            pen_detected: true,
        });
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_baseline_single_penalties() {
        let base = BaselineInputs {
            face_detected: true,
            eyes_closed: false,
            phone_detected: false,
            pen_detected: true,
        };
        assert_eq!(
            FocusCalculator::baseline(&BaselineInputs { phone_detected: true, ..base }),
            80.0
        );
        assert_eq!(
            FocusCalculator::baseline(&BaselineInputs { pen_detected: false, ..base }),
            90.0
        );
    }

    #[test]
    fn test_attentive_frames_hold_full_score() {
        let mut calc = FocusCalculator::default();
        for _ in 0..50 {
            let update = calc.score(&attentive());
            assert!((update.smoothed - 100.0).abs() < 1e-9);
            assert!(update.events.is_empty());
        }
    }

    #[test]
    fn test_long_closure_targets_25() {
        let mut calc = FocusCalculator::default();
        let update = calc.score(&FocusInputs {
            eyes_closed: true,
            eyes_closed_for: Duration::from_secs(121),
            ..attentive()
        });
        assert_eq!(update.eye_score, 25.0);
        assert_eq!(update.instantaneous, 25.0);
        assert_eq!(update.events, vec![DistractionCause::Drowsy]);
    }

    #[test]
    fn test_short_closure_targets_50() {
        let mut calc = FocusCalculator::default();
        let update = calc.score(&FocusInputs {
            eyes_closed: true,
            eyes_closed_for: Duration::from_secs(120),
            ..attentive()
        });
        assert_eq!(update.instantaneous, 50.0);
        // 0.85 * 100 + 0.15 * 50
        assert!((update.smoothed - 92.5).abs() < 1e-9);
    }

    #[test]
    fn test_face_absent_feeds_zero_through_eye_filter() {
        let mut calc = FocusCalculator::default();
        let update = calc.score(&FocusInputs {
            face_detected: false,
            ..attentive()
        });
        // 0.1 * 0 + 0.9 * 100
        assert!((update.eye_score - 90.0).abs() < 1e-9);
        assert!(update.events.is_empty());
    }

    #[test]
    fn test_partial_openness_targets() {
        let mut calc = FocusCalculator::default();
        let update = calc.score(&FocusInputs {
            openness: 0.5,
            ..attentive()
        });
        // 0.1 * 75 + 0.9 * 100
        assert!((update.eye_score - 97.5).abs() < 1e-9);
    }

    #[test]
    fn test_phone_penalty_and_per_frame_counting() {
        let mut calc = FocusCalculator::default();
        let phone = FocusInputs {
            phone_detected: true,
            ..attentive()
        };

        let first = calc.score(&phone);
        assert_eq!(first.instantaneous, 80.0);
        assert!(first.events.contains(&DistractionCause::MobileDetected));

        calc.score(&phone);
        let third = calc.score(&phone);
        assert_eq!(third.distraction_count, 3);
    }

    #[test]
    fn test_rising_edge_counting() {
        let mut calc = FocusCalculator::new(ScoreConfig {
            counting: DistractionCounting::RisingEdge,
            ..Default::default()
        });
        let phone = FocusInputs {
            phone_detected: true,
            ..attentive()
        };

        calc.score(&phone);
        calc.score(&phone);
        calc.score(&attentive());
        let update = calc.score(&phone);
        assert_eq!(update.distraction_count, 2);
    }

    #[test]
    fn test_inactivity_event_has_no_penalty() {
        let mut calc = FocusCalculator::default();
        let update = calc.score(&FocusInputs {
            pen_idle: Duration::from_secs(301),
            ..attentive()
        });
        assert_eq!(update.events, vec![DistractionCause::Inactivity]);
        assert!((update.smoothed - 100.0).abs() < 1e-9);
        assert_eq!(update.distraction_count, 0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut calc = FocusCalculator::default();
        for _ in 0..10 {
            calc.score(&FocusInputs {
                face_detected: false,
                phone_detected: true,
                ..attentive()
            });
        }
        assert!(calc.state().smoothed_score < 100.0);

        calc.reset();
        assert_eq!(
            calc.state(),
            FocusState {
                smoothed_score: INITIAL_SCORE,
                distraction_count: 0
            }
        );
    }

    proptest! {
        #[test]
        fn prop_smoothed_score_stays_in_range(
            frames in proptest::collection::vec(
                (any::<bool>(), any::<bool>(), 0u64..400, 0.0f64..=1.0, any::<bool>()),
                1..300,
            )
        ) {
            let mut calc = FocusCalculator::default();
            for (face, closed, closed_secs, openness, phone) in frames {
                let update = calc.score(&FocusInputs {
                    face_detected: face,
                    eyes_closed: closed,
                    eyes_closed_for: Duration::from_secs(closed_secs),
                    openness,
                    phone_detected: phone,
                    pen_detected: false,
                    pen_idle: Duration::ZERO,
                });
                prop_assert!((0.0..=100.0).contains(&update.smoothed));
            }
        }
    }
}
