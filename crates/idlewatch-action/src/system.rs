//! Power off the host machine

use async_trait::async_trait;
use std::borrow::Cow;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{ActionError, ActionResult, TerminalAction};

/// Runs a privileged poweroff command, `systemctl poweroff` by default
#[derive(Debug, Clone)]
pub struct SystemPowerOffAction {
    argv: Vec<String>,
}

impl SystemPowerOffAction {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl TerminalAction for SystemPowerOffAction {
    fn describe(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn perform(&self) -> ActionResult<()> {
        let (program, args) = self.argv.split_first().ok_or(ActionError::EmptyCommand)?;
        let command = self.describe();

        if !nix::unistd::geteuid().is_root() {
            warn!(command = %command, "Not running as root; poweroff may be refused");
        }

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ActionError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ActionError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(command = %command, "Poweroff command completed");
        Ok(())
    }
}
