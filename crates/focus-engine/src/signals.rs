//! Per-frame detection signals and the adapter seam
//!
//! Landmark extraction and object detection run outside this crate. A
//! `SignalAdapter` hands their structured output to the engine, which only
//! ever sees coordinates, labels and confidences.

use std::time::{Duration, Instant};

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::ObjectConfig;

/// Errors raised by a signal adapter for a single frame
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Frame rejected by detector: {0}")]
    InvalidFrame(String),
}

/// Image-space point (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned detection box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Eye contours of the single tracked face
///
/// Each eye holds six points `p0..p5`: `p0`/`p3` are the horizontal corners,
/// `p1`/`p5` and `p2`/`p4` the upper/lower lid pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: Vec<Point>,
    pub right_eye: Vec<Point>,
}

/// One object detector hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Everything the adapters report for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSignals {
    /// `None` when no face was found
    pub face: Option<FaceLandmarks>,
    pub objects: Vec<Detection>,
}

/// Runs the external detectors on a frame
pub trait SignalAdapter: Send {
    fn analyze(&mut self, frame: &VideoFrame) -> Result<FrameSignals, AdapterError>;
}

/// Eye aspect ratio of one six-point contour
///
/// Returns `None` for malformed input: too few points, a collapsed eye
/// width, or a non-finite result.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f64> {
    if eye.len() < 6 {
        return None;
    }
    let horizontal = eye[0].distance(&eye[3]);
    if !horizontal.is_finite() || horizontal < f64::EPSILON {
        return None;
    }
    let ear = (eye[1].distance(&eye[5]) + eye[2].distance(&eye[4])) / (2.0 * horizontal);
    ear.is_finite().then_some(ear)
}

/// Build a six-point contour with the given width and aspect ratio
pub fn eye_contour(center: Point, width: f32, ear: f64) -> Vec<Point> {
    let half_w = width / 2.0;
    let half_v = (ear * width as f64 / 2.0) as f32;
    let third = width / 6.0;
    vec![
        Point::new(center.x - half_w, center.y),
        Point::new(center.x - third, center.y - half_v),
        Point::new(center.x + third, center.y - half_v),
        Point::new(center.x + half_w, center.y),
        Point::new(center.x + third, center.y + half_v),
        Point::new(center.x - third, center.y + half_v),
    ]
}

/// Stand-in adapter: a steady, open-eyed face and no objects
pub struct MockAdapter {
    ear: f64,
}

impl MockAdapter {
    pub fn new() -> Self {
        warn!("No detection backend configured. Using mock signal adapter.");
        Self { ear: 0.32 }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAdapter for MockAdapter {
    fn analyze(&mut self, frame: &VideoFrame) -> Result<FrameSignals, AdapterError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(AdapterError::InvalidFrame("empty frame".into()));
        }
        let w = frame.width as f32;
        let h = frame.height as f32;
        let eye_width = w * 0.08;

        Ok(FrameSignals {
            face: Some(FaceLandmarks {
                left_eye: eye_contour(Point::new(w * 0.40, h * 0.35), eye_width, self.ear),
                right_eye: eye_contour(Point::new(w * 0.60, h * 0.35), eye_width, self.ear),
            }),
            objects: Vec::new(),
        })
    }
}

/// Phone and pen signals extracted from the detections of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObjectSignals {
    pub phone_detected: bool,
    /// Most confident pen box, if any
    pub pen: Option<BoundingBox>,
}

/// Filters raw detections into phone/pen signals
#[derive(Debug, Clone)]
pub struct ObjectClassifier {
    config: ObjectConfig,
}

impl ObjectClassifier {
    pub fn new(config: ObjectConfig) -> Self {
        let config = ObjectConfig {
            phone_labels: lowercase_all(&config.phone_labels),
            pen_labels: lowercase_all(&config.pen_labels),
            ..config
        };
        Self { config }
    }

    pub fn classify(&self, objects: &[Detection]) -> ObjectSignals {
        let mut signals = ObjectSignals::default();
        let mut best_pen_confidence = f32::MIN;

        for det in objects.iter().filter(|d| d.confidence >= self.config.min_confidence) {
            let label = det.label.to_lowercase();

            if matches_any(&label, &self.config.phone_labels) {
                // Small boxes are usually a pen misread as a phone
                let min = self.config.min_phone_box_px;
                if det.bbox.width < min && det.bbox.height < min {
                    continue;
                }
                signals.phone_detected = true;
            } else if matches_any(&label, &self.config.pen_labels)
                && det.confidence > best_pen_confidence
            {
                best_pen_confidence = det.confidence;
                signals.pen = Some(det.bbox);
            }
        }

        signals
    }
}

fn lowercase_all(labels: &[String]) -> Vec<String> {
    labels.iter().map(|l| l.to_lowercase()).collect()
}

fn matches_any(label: &str, fragments: &[String]) -> bool {
    fragments.iter().any(|f| label.contains(f.as_str()))
}

/// Pen presence and time since it last moved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenObservation {
    pub detected: bool,
    pub idle: Duration,
}

/// Tracks writing activity from successive pen boxes
#[derive(Debug, Clone)]
pub struct PenActivityTracker {
    motion_px: f64,
    anchor: Option<Point>,
    last_activity: Option<Instant>,
}

impl PenActivityTracker {
    pub fn new(motion_px: f32) -> Self {
        Self {
            motion_px: motion_px as f64,
            anchor: None,
            last_activity: None,
        }
    }

    pub fn observe(&mut self, pen: Option<&BoundingBox>, now: Instant) -> PenObservation {
        let last_activity = *self.last_activity.get_or_insert(now);

        let Some(bbox) = pen else {
            return PenObservation {
                detected: false,
                idle: now.saturating_duration_since(last_activity),
            };
        };

        let center = bbox.center();
        let moved = match self.anchor {
            Some(anchor) => anchor.distance(&center) > self.motion_px,
            None => true,
        };
        if moved {
            self.anchor = Some(center);
            self.last_activity = Some(now);
        }

        PenObservation {
            detected: true,
            idle: now.saturating_duration_since(self.last_activity.unwrap_or(now)),
        }
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.last_activity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32, w: f32, h: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox: BoundingBox {
                x: 10.0,
                y: 10.0,
                width: w,
                height: h,
            },
        }
    }

    #[test]
    fn test_ear_of_synthetic_contour() {
        let eye = eye_contour(Point::new(100.0, 100.0), 30.0, 0.3);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!((ear - 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_ear_rejects_malformed_contours() {
        assert_eq!(eye_aspect_ratio(&[Point::new(0.0, 0.0); 4]), None);
        // Collapsed width
        assert_eq!(eye_aspect_ratio(&[Point::new(5.0, 5.0); 6]), None);

        let mut eye = eye_contour(Point::new(0.0, 0.0), 20.0, 0.3);
        eye[1].y = f32::NAN;
        assert_eq!(eye_aspect_ratio(&eye), None);
    }

    #[test]
    fn test_phone_detection_filters() {
        let classifier = ObjectClassifier::new(ObjectConfig::default());

        assert!(classifier.classify(&[detection("cell phone", 0.8, 120.0, 200.0)]).phone_detected);
        assert!(classifier.classify(&[detection("Mobile", 0.5, 90.0, 40.0)]).phone_detected);

        // Below confidence
        assert!(!classifier.classify(&[detection("cell phone", 0.2, 120.0, 200.0)]).phone_detected);
        // Small on both sides
        assert!(!classifier.classify(&[detection("cell phone", 0.9, 60.0, 70.0)]).phone_detected);
        // Unrelated label
        assert!(!classifier.classify(&[detection("cup", 0.9, 120.0, 200.0)]).phone_detected);
    }

    #[test]
    fn test_pen_keeps_most_confident_box() {
        let classifier = ObjectClassifier::new(ObjectConfig::default());
        let mut strong = detection("pen", 0.9, 10.0, 40.0);
        strong.bbox.x = 300.0;
        let signals = classifier.classify(&[detection("Pen", 0.5, 10.0, 40.0), strong.clone()]);

        assert!(!signals.phone_detected);
        assert_eq!(signals.pen, Some(strong.bbox));
    }

    #[test]
    fn test_pen_idle_grows_while_still_and_resets_on_motion() {
        let mut tracker = PenActivityTracker::new(12.0);
        let t0 = Instant::now();
        let still = BoundingBox {
            x: 100.0,
            y: 100.0,
            width: 10.0,
            height: 40.0,
        };

        let first = tracker.observe(Some(&still), t0);
        assert!(first.detected);
        assert_eq!(first.idle, Duration::ZERO);

        let later = tracker.observe(Some(&still), t0 + Duration::from_secs(30));
        assert_eq!(later.idle, Duration::from_secs(30));

        let moved = BoundingBox { x: 140.0, ..still };
        let after_move = tracker.observe(Some(&moved), t0 + Duration::from_secs(31));
        assert_eq!(after_move.idle, Duration::ZERO);

        let gone = tracker.observe(None, t0 + Duration::from_secs(41));
        assert!(!gone.detected);
        assert_eq!(gone.idle, Duration::from_secs(10));
    }

    #[test]
    fn test_small_jitter_is_not_activity() {
        let mut tracker = PenActivityTracker::new(12.0);
        let t0 = Instant::now();
        let pen = BoundingBox {
            x: 50.0,
            y: 50.0,
            width: 8.0,
            height: 30.0,
        };
        tracker.observe(Some(&pen), t0);
        let jitter = BoundingBox { x: 53.0, y: 52.0, ..pen };
        let obs = tracker.observe(Some(&jitter), t0 + Duration::from_secs(5));
        assert_eq!(obs.idle, Duration::from_secs(5));
    }

    #[test]
    fn test_mock_adapter_reports_open_face() {
        let frame = VideoFrame::new(vec![0; 64 * 48 * 3], 64, 48, 0, 0).unwrap();
        let signals = MockAdapter::new().analyze(&frame).unwrap();
        let face = signals.face.unwrap();
        assert!(eye_aspect_ratio(&face.left_eye).unwrap() > 0.3);
        assert!(signals.objects.is_empty());
    }
}
