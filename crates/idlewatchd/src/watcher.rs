//! Connect, monitor, reconnect

use anyhow::{Context, Result};
use idlewatch_action::build_gateway;
use idlewatch_config::WatcherConfig;
use idlewatch_core::{Monitor, MonitorExit};
use idlewatch_rpc::{ConnectOutcome, ConnectPolicy, Dialer, WsDialer, connect};
use idlewatch_util::{CancelToken, whole_minutes};
use tracing::{info, warn};

/// The connect, monitor, reconnect loop
pub struct Watcher {
    config: WatcherConfig,
    cancel: CancelToken,
}

impl Watcher {
    pub fn new(config: WatcherConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    pub fn log_config(&self) {
        let config = &self.config;
        info!(
            url = %config.endpoint.url(),
            tls_verify = config.endpoint.tls_verify,
            min_uptime_minutes = whole_minutes(config.monitor.min_uptime),
            idle_timeout_minutes = whole_minutes(config.monitor.idle_timeout),
            poll_interval = ?config.monitor.poll_interval,
            request_timeout = ?config.request_timeout,
            shutdown_action = %config.shutdown_action,
            fatal_on_auth_rejection = config.fatal_on_auth_rejection,
            dry_run = config.monitor.dry_run,
            "Configuration loaded"
        );

        if config.monitor.dry_run {
            warn!("TEST MODE enabled: the shutdown action will be logged, never executed");
        }
    }

    /// Run until cancelled or the live action completes.
    ///
    /// Fails only when the credential is rejected under a fatal policy.
    pub async fn run(self) -> Result<()> {
        let dialer = WsDialer::new(self.config.endpoint.clone())
            .with_request_timeout(self.config.request_timeout);
        let policy = ConnectPolicy {
            fatal_on_auth_rejection: self.config.fatal_on_auth_rejection,
            ..Default::default()
        };

        // Created on the first connection and kept across reconnects so the
        // uptime and idle clocks survive a dropped connection.
        let mut monitor: Option<Monitor> = None;

        loop {
            let connection = match connect(&dialer, &policy, &self.cancel).await {
                ConnectOutcome::Connected(connection) => connection,
                ConnectOutcome::Cancelled => {
                    info!("Shutdown requested before a connection was established");
                    return Ok(());
                }
                ConnectOutcome::Rejected(e) => {
                    return Err(e).with_context(|| {
                        format!("Server at {} rejected the credential", dialer.target())
                    });
                }
            };

            let gateway = build_gateway(&self.config, &connection);
            let active = monitor.get_or_insert_with(|| {
                info!("Starting player monitoring");
                Monitor::new(&self.config.monitor)
            });

            let exit = active.run(&connection, gateway.as_ref(), &self.cancel).await;
            connection.close().await;

            match exit {
                MonitorExit::Cancelled => {
                    info!("Monitoring stopped");
                    return Ok(());
                }
                MonitorExit::ActionCompleted => {
                    info!("Server shutdown initiated, exiting");
                    return Ok(());
                }
                MonitorExit::ConnectionLost(reason) => {
                    warn!(reason = %reason, "Connection lost, reconnecting");
                }
            }
        }
    }
}
