//! Shared utilities for idlewatch
//!
//! This crate provides:
//! - ID types (RequestId, ParticipantId, RunId)
//! - Time utilities (monotonic instants, injectable clocks, minute truncation)
//! - Exponential backoff policy for reconnects
//! - Cooperative cancellation token

mod backoff;
mod cancel;
mod ids;
mod time;

pub use backoff::*;
pub use cancel::*;
pub use ids::*;
pub use time::*;
