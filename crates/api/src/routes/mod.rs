//! Route handlers

pub mod focus;
pub mod session;
pub mod video;
