//! Camera Capture Library for the Focus Tracker
//!
//! Provides the frame sources a focus session reads from:
//! - V4L2 webcam (Linux)
//! - Synthetic test pattern (no hardware required)
//! - Replay of a directory of still images
//!
//! plus JPEG encoding of frames for the live video stream.

#[cfg(target_os = "linux")]
pub mod device;
pub mod encode;
pub mod frame;
pub mod source;

#[cfg(target_os = "linux")]
pub use device::DeviceSource;
pub use encode::JpegEncoder;
pub use frame::VideoFrame;
pub use source::{open_source, FrameSource, FrameSourceFactory, ReplaySource, SyntheticSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera disconnected: {0}")]
    Disconnected(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl CameraError {
    /// Whether the capture loop may skip this frame and keep going
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CameraError::Format(_) | CameraError::Stream(_) | CameraError::Timeout
        )
    }
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraSource {
    /// Webcam device node (e.g., "/dev/video0")
    Device { path: PathBuf },
    /// Generated moving test pattern
    Synthetic,
    /// Still images read in file-name order from a directory
    Replay {
        dir: PathBuf,
        #[serde(default = "default_looped")]
        looped: bool,
    },
}

fn default_looped() -> bool {
    true
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame source
    pub source: CameraSource,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// JPEG quality for the video stream (1-100)
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::Device {
                path: PathBuf::from("/dev/video0"),
            },
            width: 640,
            height: 480,
            fps: 30,
            jpeg_quality: 80,
        }
    }
}

impl CameraConfig {
    /// Generated test pattern at `width`x`height`
    pub fn synthetic(width: u32, height: u32) -> Self {
        Self {
            source: CameraSource::Synthetic,
            width,
            height,
            ..Default::default()
        }
    }

    /// Replay images from a directory, looping forever
    pub fn replay(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: CameraSource::Replay {
                dir: dir.into(),
                looped: true,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(CameraError::Timeout.is_transient());
        assert!(CameraError::Stream("short read".into()).is_transient());
        assert!(!CameraError::Disconnected("unplugged".into()).is_transient());
        assert!(!CameraError::Open("busy".into()).is_transient());
    }

    #[test]
    fn test_default_source_is_first_webcam() {
        assert_eq!(
            CameraConfig::default().source,
            CameraSource::Device {
                path: PathBuf::from("/dev/video0")
            }
        );
        let source: CameraSource =
            serde_json::from_str(r#"{"kind":"device","path":"/dev/video2"}"#).unwrap();
        assert_eq!(
            source,
            CameraSource::Device {
                path: PathBuf::from("/dev/video2")
            }
        );
    }

    #[test]
    fn test_source_deserializes_tagged() {
        let source: CameraSource =
            serde_json::from_str(r#"{"kind":"replay","dir":"/tmp/frames"}"#).unwrap();
        assert_eq!(
            source,
            CameraSource::Replay {
                dir: PathBuf::from("/tmp/frames"),
                looped: true
            }
        );
    }
}
