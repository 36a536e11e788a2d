//! Session errors

use camera_capture::CameraError;
use thiserror::Error;

/// Errors surfaced by session start/stop
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("No active session")]
    NotRunning,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(#[source] CameraError),
}
