//! Validated configuration types

use crate::schema::RawConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 25566;
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 10;
pub const DEFAULT_MIN_UPTIME_MINUTES: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "systemctl poweroff";

/// Bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Where and how to reach the management API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Connect with wss:// instead of ws://
    pub tls: bool,
    /// Verify the server certificate; management servers usually run with
    /// self-signed certificates, so this is off by default
    pub tls_verify: bool,
    pub secret: Secret,
}

impl Endpoint {
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// Thresholds and cadence for the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPolicy {
    pub min_uptime: Duration,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    pub dry_run: bool,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            min_uptime: Duration::from_secs(DEFAULT_MIN_UPTIME_MINUTES * 60),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_MINUTES * 60),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            dry_run: false,
        }
    }
}

/// Which terminal action to take once the shutdown conditions hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownAction {
    /// Ask the server to stop itself over the management API
    #[default]
    ServerStop,
    /// Run the privileged poweroff command on this machine
    PowerOff,
    /// Stop the server, then power off
    Both,
}

impl ShutdownAction {
    pub fn runs_command(self) -> bool {
        matches!(self, ShutdownAction::PowerOff | ShutdownAction::Both)
    }

    pub fn stops_server(self) -> bool {
        matches!(self, ShutdownAction::ServerStop | ShutdownAction::Both)
    }
}

impl FromStr for ShutdownAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server-stop" | "server_stop" | "stop" => Ok(Self::ServerStop),
            "poweroff" | "power-off" | "system" => Ok(Self::PowerOff),
            "both" => Ok(Self::Both),
            _ => Err("expected one of: server-stop, poweroff, both".into()),
        }
    }
}

impl fmt::Display for ShutdownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownAction::ServerStop => "server-stop",
            ShutdownAction::PowerOff => "poweroff",
            ShutdownAction::Both => "both",
        })
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub endpoint: Endpoint,
    pub monitor: MonitorPolicy,
    pub shutdown_action: ShutdownAction,
    /// argv for the poweroff action
    pub shutdown_command: Vec<String>,
    pub fatal_on_auth_rejection: bool,
    pub request_timeout: Duration,
}

impl WatcherConfig {
    /// Convert a validated raw config, filling defaults
    pub fn from_raw(raw: RawConfig) -> Self {
        let endpoint = Endpoint {
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            tls: raw.tls_enabled.unwrap_or(true),
            tls_verify: raw.tls_verify.unwrap_or(false),
            secret: Secret::new(raw.secret.unwrap_or_default()),
        };

        let monitor = MonitorPolicy {
            min_uptime: minutes(raw.min_uptime_minutes.unwrap_or(DEFAULT_MIN_UPTIME_MINUTES)),
            idle_timeout: minutes(
                raw.idle_timeout_minutes
                    .unwrap_or(DEFAULT_IDLE_TIMEOUT_MINUTES),
            ),
            poll_interval: Duration::from_secs(
                raw.poll_interval_seconds
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
            ),
            dry_run: raw.dry_run.unwrap_or(false),
        };

        let shutdown_action = raw
            .shutdown_action
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let shutdown_command = raw
            .shutdown_command
            .as_deref()
            .unwrap_or(DEFAULT_SHUTDOWN_COMMAND)
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Self {
            endpoint,
            monitor,
            shutdown_action,
            shutdown_command,
            fatal_on_auth_rejection: raw.fatal_on_auth_rejection.unwrap_or(false),
            request_timeout: Duration::from_secs(
                raw.request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            ),
        }
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}
