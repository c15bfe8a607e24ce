//! Configuration validation

use crate::policy::ShutdownAction;
use crate::schema::{env, RawConfig};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{key} is required")]
    MissingRequired { key: &'static str },

    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },

    #[error("{key} must be at least {min}")]
    TooSmall { key: &'static str, min: u64 },
}

/// Validate a raw configuration (after environment overrides are applied)
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.secret.as_deref().is_none_or(|s| s.trim().is_empty()) {
        errors.push(ValidationError::MissingRequired { key: env::SECRET });
    }

    if let Some(host) = &config.host
        && host.trim().is_empty()
    {
        errors.push(ValidationError::InvalidValue {
            key: env::HOST,
            value: host.clone(),
            message: "host cannot be empty".into(),
        });
    }

    if config.port == Some(0) {
        errors.push(ValidationError::TooSmall {
            key: env::PORT,
            min: 1,
        });
    }

    if config.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::TooSmall {
            key: env::POLL_INTERVAL_SECONDS,
            min: 1,
        });
    }

    if config.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::TooSmall {
            key: env::REQUEST_TIMEOUT_SECONDS,
            min: 1,
        });
    }

    let action = match config.shutdown_action.as_deref() {
        Some(value) => match value.parse::<ShutdownAction>() {
            Ok(action) => Some(action),
            Err(message) => {
                errors.push(ValidationError::InvalidValue {
                    key: env::SHUTDOWN_ACTION,
                    value: value.to_string(),
                    message,
                });
                None
            }
        },
        None => Some(ShutdownAction::default()),
    };

    if action.is_some_and(ShutdownAction::runs_command)
        && let Some(command) = &config.shutdown_command
        && command.split_whitespace().next().is_none()
    {
        errors.push(ValidationError::InvalidValue {
            key: env::SHUTDOWN_COMMAND,
            value: command.clone(),
            message: "command cannot be empty".into(),
        });
    }

    errors
}

/// Overlay environment variables onto `config`.
///
/// Unset and empty variables leave the existing value alone. Values that do
/// not parse are reported rather than silently replaced by defaults.
pub fn apply_env<F>(config: &mut RawConfig, lookup: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(env::HOST) {
        config.host = Some(v);
    }
    if let Some(v) = get(env::SECRET) {
        config.secret = Some(v);
    }
    if let Some(v) = get(env::SHUTDOWN_ACTION) {
        config.shutdown_action = Some(v);
    }
    if let Some(v) = get(env::SHUTDOWN_COMMAND) {
        config.shutdown_command = Some(v);
    }

    if let Some(v) = get(env::PORT) {
        match v.trim().parse::<u16>() {
            Ok(port) => config.port = Some(port),
            Err(e) => errors.push(invalid(env::PORT, &v, e.to_string())),
        }
    }

    let bools: [(&'static str, &mut Option<bool>); 4] = [
        (env::TLS_ENABLED, &mut config.tls_enabled),
        (env::TLS_VERIFY, &mut config.tls_verify),
        (env::DRY_RUN, &mut config.dry_run),
        (env::FATAL_ON_AUTH_REJECTION, &mut config.fatal_on_auth_rejection),
    ];
    for (key, slot) in bools {
        if let Some(v) = get(key) {
            match parse_bool(&v) {
                Some(b) => *slot = Some(b),
                None => errors.push(invalid(key, &v, "expected true or false".into())),
            }
        }
    }

    let numbers: [(&'static str, &mut Option<u64>); 4] = [
        (env::IDLE_TIMEOUT_MINUTES, &mut config.idle_timeout_minutes),
        (env::MIN_UPTIME_MINUTES, &mut config.min_uptime_minutes),
        (env::POLL_INTERVAL_SECONDS, &mut config.poll_interval_seconds),
        (env::REQUEST_TIMEOUT_SECONDS, &mut config.request_timeout_seconds),
    ];
    for (key, slot) in numbers {
        if let Some(v) = get(key) {
            match v.trim().parse::<u64>() {
                Ok(n) => *slot = Some(n),
                Err(e) => errors.push(invalid(key, &v, e.to_string())),
            }
        }
    }

    errors
}

/// Accepts the spellings commonly used for booleans in environment files
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &'static str, value: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        key,
        value: value.to_string(),
        message,
    }
}
