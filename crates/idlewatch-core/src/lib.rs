//! Idle shutdown decision engine for idlewatch
//!
//! This crate contains:
//! - The decision engine (Polling -> Stopped, one-shot)
//! - Uptime and idle clocks on monotonic time
//! - The polling monitor that drives the engine against a live server

mod engine;
mod events;
mod monitor;

pub use engine::*;
pub use events::*;
pub use monitor::*;
