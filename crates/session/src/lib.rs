//! Focus Session Worker
//!
//! Owns the single capture loop: start/stop lifecycle, per-frame analysis,
//! throttled snapshot publication and the latest encoded frame.

mod capture;
mod config;
mod error;
mod worker;

pub use config::SessionConfig;
pub use error::SessionError;
pub use worker::{AdapterFactory, SessionWorker, StartReport};
