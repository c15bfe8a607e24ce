//! Polling loop that drives the decision engine

use async_trait::async_trait;
use idlewatch_action::TerminalAction;
use idlewatch_api::{Participant, ParticipantList, methods};
use idlewatch_config::MonitorPolicy;
use idlewatch_rpc::{Connection, RpcResult};
use idlewatch_util::{CancelToken, Clock, SystemClock, format_duration, whole_minutes};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{CoreEvent, DecisionEngine, Thresholds};

/// Where participant lists come from
#[async_trait]
pub trait ParticipantSource: Send + Sync {
    async fn list_participants(&self) -> RpcResult<Vec<Participant>>;
}

#[async_trait]
impl ParticipantSource for Connection {
    async fn list_participants(&self) -> RpcResult<Vec<Participant>> {
        let list: ParticipantList = self.call_typed(methods::LIST_PARTICIPANTS, None).await?;
        Ok(list.into_vec())
    }
}

/// Why [`Monitor::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// Cancellation was observed between ticks
    Cancelled,
    /// A live terminal action succeeded
    ActionCompleted,
    /// The connection died; the caller should reconnect and run again
    ConnectionLost(String),
}

/// Ticks at a fixed interval, polls, and runs the terminal action when due.
///
/// The engine (and therefore both clocks) lives as long as the monitor, so
/// running the same monitor over a new connection keeps uptime and idle time.
pub struct Monitor<C: Clock = SystemClock> {
    engine: DecisionEngine,
    clock: C,
    poll_interval: Duration,
}

impl Monitor<SystemClock> {
    pub fn new(policy: &MonitorPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> Monitor<C> {
    pub fn with_clock(policy: &MonitorPolicy, clock: C) -> Self {
        let engine = DecisionEngine::new(Thresholds::from(policy), policy.dry_run, clock.now());
        Self {
            engine,
            clock,
            poll_interval: policy.poll_interval,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Run until cancelled, the live action succeeds, or the connection is lost.
    ///
    /// The first tick fires immediately. Cancellation is only checked while
    /// waiting for a tick; an in-flight poll always runs to completion.
    pub async fn run(
        &mut self,
        source: &dyn ParticipantSource,
        action: &dyn TerminalAction,
        cancel: &CancelToken,
    ) -> MonitorExit {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Monitor cancelled");
                    return MonitorExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            if let Some(exit) = self.tick(source, action).await {
                return exit;
            }
        }
    }

    /// One poll-evaluate-act cycle
    pub async fn tick(
        &mut self,
        source: &dyn ParticipantSource,
        action: &dyn TerminalAction,
    ) -> Option<MonitorExit> {
        let polled = source.list_participants().await;
        let now = self.clock.now();

        let participants = match polled {
            Ok(participants) => participants,
            Err(e) => {
                let lost = e.is_transport_lost();
                log_event(&self.engine.poll_failed(e.to_string()));
                return lost.then(|| MonitorExit::ConnectionLost(e.to_string()));
            }
        };

        let events = self.engine.observe(&participants, now);
        let mut due = false;
        for event in &events {
            log_event(event);
            due |= matches!(event, CoreEvent::ShutdownDue { .. });
        }
        if !due {
            return None;
        }

        let outcome = action.execute(self.engine.dry_run()).await;
        log_event(&self.engine.record_action(&outcome));

        (outcome.is_ok() && !self.engine.dry_run()).then_some(MonitorExit::ActionCompleted)
    }
}

fn log_event(event: &CoreEvent) {
    match event {
        CoreEvent::ParticipantsOnline { names } => {
            info!(count = names.len(), players = %names.join(", "), "Players online");
        }
        CoreEvent::Idle { idle_for } => {
            info!(
                idle_minutes = whole_minutes(*idle_for),
                idle_for = %format_duration(*idle_for),
                "No players online"
            );
        }
        CoreEvent::Status(evaluation) => {
            info!(
                uptime_minutes = whole_minutes(evaluation.uptime),
                idle_minutes = whole_minutes(evaluation.idle),
                shutdown_due = evaluation.shutdown_due,
                "Server status"
            );
        }
        CoreEvent::ShutdownDue { uptime, idle } => {
            warn!(
                uptime = %format_duration(*uptime),
                idle = %format_duration(*idle),
                "Shutdown conditions met"
            );
        }
        CoreEvent::PollFailed { error } => {
            error!(error = %error, "Failed to get player list");
        }
        CoreEvent::ActionCompleted { dry_run: true } => {
            info!("Dry run complete; continuing to monitor");
        }
        CoreEvent::ActionCompleted { dry_run: false } => {
            info!("Shutdown action completed");
        }
        CoreEvent::ActionFailed { error } => {
            error!(error = %error, "Shutdown action failed; will retry on next poll");
        }
    }
}
