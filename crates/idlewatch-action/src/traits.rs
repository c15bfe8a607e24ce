//! Terminal action trait

use async_trait::async_trait;
use idlewatch_rpc::RpcError;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from performing a terminal action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Management API call failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("No shutdown command configured")]
    EmptyCommand,

    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Failed(String),
}

pub type ActionResult<T> = Result<T, ActionError>;

/// An irreversible shutdown step
#[async_trait]
pub trait TerminalAction: Send + Sync {
    /// The literal action, as an operator would type or read it
    fn describe(&self) -> String;

    /// Carry out the action for real
    async fn perform(&self) -> ActionResult<()>;

    /// Run the action, or only log it when `dry_run` is set.
    ///
    /// Dry runs always succeed.
    async fn execute(&self, dry_run: bool) -> ActionResult<()> {
        let action = self.describe();
        if dry_run {
            warn!(action = %action, "TEST MODE: Would execute server shutdown now");
            return Ok(());
        }

        info!(action = %action, "Executing terminal action");
        self.perform().await
    }
}
