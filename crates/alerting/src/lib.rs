//! Alerting System
//!
//! Turns distraction events into notifications: per-cause cooldowns,
//! an hourly cap, and a pluggable delivery sink.

mod manager;
mod sink;

pub use manager::{AlertConfig, AlertManager};
pub use sink::{AlertSink, LogSink, MemorySink, Notification};
