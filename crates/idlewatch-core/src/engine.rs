//! Shutdown decision engine

use idlewatch_action::ActionResult;
use idlewatch_api::{Participant, participant_names};
use idlewatch_config::MonitorPolicy;
use idlewatch_util::{MonotonicInstant, whole_minutes};
use std::time::Duration;

use crate::CoreEvent;

/// How long the server must have been up, and empty, before shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min_uptime: Duration,
    pub idle_timeout: Duration,
}

impl From<&MonitorPolicy> for Thresholds {
    fn from(policy: &MonitorPolicy) -> Self {
        Self {
            min_uptime: policy.min_uptime,
            idle_timeout: policy.idle_timeout,
        }
    }
}

/// Shutdown predicate.
///
/// Both sides are compared in whole minutes. Neither condition alone is
/// enough.
pub fn shutdown_due(uptime: Duration, idle: Duration, thresholds: &Thresholds) -> bool {
    whole_minutes(uptime) >= whole_minutes(thresholds.min_uptime)
        && whole_minutes(idle) >= whole_minutes(thresholds.idle_timeout)
}

/// The uptime and idle clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPair {
    pub started_at: MonotonicInstant,
    /// Last time a poll saw anyone online. Never moves backwards.
    pub last_nonempty: MonotonicInstant,
}

impl ClockPair {
    pub fn new(now: MonotonicInstant) -> Self {
        Self {
            started_at: now,
            last_nonempty: now,
        }
    }

    pub fn uptime(&self, now: MonotonicInstant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn idle(&self, now: MonotonicInstant) -> Duration {
        now.saturating_duration_since(self.last_nonempty)
    }

    fn saw_participants(&mut self, now: MonotonicInstant) {
        self.last_nonempty = self.last_nonempty.max(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Polling,
    /// The terminal action has succeeded; irreversible
    Stopped,
}

/// Clock readings and the predicate at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub uptime: Duration,
    pub idle: Duration,
    pub shutdown_due: bool,
}

/// Pure decision state machine. Time is always passed in.
#[derive(Debug)]
pub struct DecisionEngine {
    thresholds: Thresholds,
    dry_run: bool,
    clocks: ClockPair,
    state: EngineState,
}

impl DecisionEngine {
    /// Start both clocks at `now`
    pub fn new(thresholds: Thresholds, dry_run: bool, now: MonotonicInstant) -> Self {
        Self {
            thresholds,
            dry_run,
            clocks: ClockPair::new(now),
            state: EngineState::Polling,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn clocks(&self) -> &ClockPair {
        &self.clocks
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == EngineState::Stopped
    }

    pub fn evaluate(&self, now: MonotonicInstant) -> Evaluation {
        let uptime = self.clocks.uptime(now);
        let idle = self.clocks.idle(now);
        Evaluation {
            uptime,
            idle,
            shutdown_due: shutdown_due(uptime, idle, &self.thresholds),
        }
    }

    /// Feed the result of a successful poll taken at `now`.
    ///
    /// Emits `ShutdownDue` only while still polling; the caller runs the
    /// terminal action and reports back through [`record_action`].
    ///
    /// [`record_action`]: DecisionEngine::record_action
    pub fn observe(&mut self, participants: &[Participant], now: MonotonicInstant) -> Vec<CoreEvent> {
        let mut events = Vec::with_capacity(3);

        if participants.is_empty() {
            events.push(CoreEvent::Idle {
                idle_for: self.clocks.idle(now),
            });
        } else {
            self.clocks.saw_participants(now);
            events.push(CoreEvent::ParticipantsOnline {
                names: participant_names(participants),
            });
        }

        let evaluation = self.evaluate(now);
        events.push(CoreEvent::Status(evaluation));

        if self.state == EngineState::Polling && evaluation.shutdown_due {
            events.push(CoreEvent::ShutdownDue {
                uptime: evaluation.uptime,
                idle: evaluation.idle,
            });
        }

        events
    }

    /// A poll failed. This is not evidence that the server is empty.
    pub fn poll_failed(&self, error: impl Into<String>) -> CoreEvent {
        CoreEvent::PollFailed {
            error: error.into(),
        }
    }

    /// Report the outcome of the terminal action
    pub fn record_action(&mut self, outcome: &ActionResult<()>) -> CoreEvent {
        match outcome {
            Ok(()) => {
                self.state = EngineState::Stopped;
                CoreEvent::ActionCompleted {
                    dry_run: self.dry_run,
                }
            }
            Err(e) => CoreEvent::ActionFailed {
                error: e.to_string(),
            },
        }
    }
}
