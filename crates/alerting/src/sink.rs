//! Notification delivery

use std::sync::Mutex;

use focus_engine::DistractionCause;
use serde::Serialize;
use tracing::{info, warn};

/// A notification ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub cause: DistractionCause,
    pub title: String,
    pub message: String,
}

impl From<DistractionCause> for Notification {
    fn from(cause: DistractionCause) -> Self {
        Self {
            cause,
            title: cause.title().to_string(),
            message: cause.message().to_string(),
        }
    }
}

/// Delivers notifications to the user
///
/// Called from the capture loop, so implementations must return quickly.
pub trait AlertSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Sink that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn notify(&self, notification: &Notification) {
        info!(
            cause = %notification.cause,
            "{}: {}", notification.title, notification.message
        );
    }
}

/// Sink that keeps every notification in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        match self.delivered.lock() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AlertSink for MemorySink {
    fn notify(&self, notification: &Notification) {
        match self.delivered.lock() {
            Ok(mut list) => list.push(notification.clone()),
            Err(_) => warn!("Notification store poisoned, dropping {}", notification.cause),
        }
    }
}
