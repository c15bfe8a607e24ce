//! Terminal actions for idlewatch
//!
//! A terminal action is the irreversible step taken once the server has been
//! idle long enough: asking the server to stop itself, powering off the host,
//! or both. Every action honours dry-run mode.

mod composite;
mod mock;
mod server;
mod system;
mod traits;

pub use composite::*;
pub use mock::*;
pub use server::*;
pub use system::*;
pub use traits::*;

use idlewatch_config::{ShutdownAction, WatcherConfig};
use idlewatch_rpc::Connection;

/// Build the configured terminal action for a live connection
pub fn build_gateway(config: &WatcherConfig, connection: &Connection) -> Box<dyn TerminalAction> {
    match config.shutdown_action {
        ShutdownAction::ServerStop => Box::new(ServerStopAction::new(connection.clone())),
        ShutdownAction::PowerOff => {
            Box::new(SystemPowerOffAction::new(config.shutdown_command.clone()))
        }
        ShutdownAction::Both => Box::new(CompositeAction::new(vec![
            Box::new(ServerStopAction::new(connection.clone())),
            Box::new(SystemPowerOffAction::new(config.shutdown_command.clone())),
        ])),
    }
}
