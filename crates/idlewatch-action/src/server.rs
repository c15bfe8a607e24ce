//! Stop the game server through its management API

use async_trait::async_trait;
use idlewatch_api::methods;
use idlewatch_rpc::{Connection, RpcError};
use tracing::{info, warn};

use crate::{ActionResult, TerminalAction};

/// Sends `minecraft:server/stop` over the live connection
#[derive(Debug, Clone)]
pub struct ServerStopAction {
    connection: Connection,
}

impl ServerStopAction {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TerminalAction for ServerStopAction {
    fn describe(&self) -> String {
        format!("{} via {}", methods::SERVER_STOP, self.connection.peer())
    }

    /// A server that drops the connection instead of answering is taken to
    /// be stopping.
    async fn perform(&self) -> ActionResult<()> {
        match self.connection.call(methods::SERVER_STOP, None).await {
            Ok(ack) => {
                info!(ack = %ack, "Server acknowledged stop request");
                Ok(())
            }
            Err(RpcError::TransportLost(reason)) => {
                warn!(reason = %reason, "Connection dropped while stopping; assuming the server is shutting down");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
