//! Protocol types for the server management API
//!
//! This crate defines what idlewatch sends to and receives from the server:
//! - JSON-RPC 2.0 request and response envelopes
//! - Error objects
//! - Participant records and method names

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// JSON-RPC protocol version carried in every envelope
pub const PROTOCOL_VERSION: &str = "2.0";

/// Method names understood by the management server
pub mod methods {
    /// List connected players
    pub const LIST_PARTICIPANTS: &str = "minecraft:players";

    /// Ask the server to stop itself
    pub const SERVER_STOP: &str = "minecraft:server/stop";
}
