//! Raw configuration schema (as parsed from TOML or the environment)

use serde::{Deserialize, Serialize};

/// Environment variable names, one per configurable value
pub mod env {
    pub const HOST: &str = "MINECRAFT_MGMT_HOST";
    pub const PORT: &str = "MINECRAFT_MGMT_PORT";
    pub const SECRET: &str = "MINECRAFT_MGMT_SECRET";
    pub const TLS_ENABLED: &str = "MINECRAFT_MGMT_TLS_ENABLED";
    pub const TLS_VERIFY: &str = "MINECRAFT_MGMT_TLS_VERIFY";
    pub const DRY_RUN: &str = "TEST_MODE";
    pub const IDLE_TIMEOUT_MINUTES: &str = "IDLE_TIMEOUT_MINUTES";
    pub const MIN_UPTIME_MINUTES: &str = "MIN_UPTIME_MINUTES";
    pub const POLL_INTERVAL_SECONDS: &str = "POLL_INTERVAL_SECONDS";
    pub const REQUEST_TIMEOUT_SECONDS: &str = "REQUEST_TIMEOUT_SECONDS";
    pub const SHUTDOWN_ACTION: &str = "SHUTDOWN_ACTION";
    pub const SHUTDOWN_COMMAND: &str = "SHUTDOWN_COMMAND";
    pub const FATAL_ON_AUTH_REJECTION: &str = "FATAL_ON_AUTH_REJECTION";
}

/// Raw configuration. Every field is optional; absent fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Management API host
    pub host: Option<String>,

    /// Management API port
    pub port: Option<u16>,

    /// Bearer token presented during the handshake
    pub secret: Option<String>,

    /// Use wss:// instead of ws://
    pub tls_enabled: Option<bool>,

    /// Verify the server certificate chain
    pub tls_verify: Option<bool>,

    /// Log the terminal action instead of executing it
    pub dry_run: Option<bool>,

    /// Minutes without participants before shutting down
    pub idle_timeout_minutes: Option<u64>,

    /// Minimum minutes of monitor uptime before shutting down
    pub min_uptime_minutes: Option<u64>,

    pub poll_interval_seconds: Option<u64>,

    pub request_timeout_seconds: Option<u64>,

    /// "server-stop", "poweroff" or "both"
    pub shutdown_action: Option<String>,

    /// Command line used by the poweroff action, whitespace separated
    pub shutdown_command: Option<String>,

    /// Stop retrying when the server rejects the credential
    pub fatal_on_auth_rejection: Option<bool>,
}
