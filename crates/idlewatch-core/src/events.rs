//! Events emitted by the decision engine

use std::time::Duration;

use crate::Evaluation;

/// Events emitted by the decision engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The poll returned at least one participant
    ParticipantsOnline { names: Vec<String> },

    /// The poll returned nobody
    Idle { idle_for: Duration },

    /// Clock readings after every successful poll
    Status(Evaluation),

    /// Both thresholds are met; the terminal action should run
    ShutdownDue { uptime: Duration, idle: Duration },

    /// The poll failed; clocks were left untouched
    PollFailed { error: String },

    /// The terminal action succeeded (or was only logged, in dry-run mode)
    ActionCompleted { dry_run: bool },

    /// The terminal action failed; it will be retried on a later tick
    ActionFailed { error: String },
}
