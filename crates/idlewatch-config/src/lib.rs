//! Configuration loading and validation for idlewatch
//!
//! Values come from, in increasing priority:
//! - Built-in defaults
//! - An optional TOML file
//! - Environment variables (see [`schema::env`])
//!
//! Everything is validated before any connection is attempted; a missing
//! credential is fatal.

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load configuration from the process environment and an optional file
pub fn load_config(path: Option<&Path>) -> ConfigResult<WatcherConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the process environment
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<WatcherConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = match path {
        Some(path) => {
            debug!(path = %path.display(), "Reading config file");
            parse_config(&std::fs::read_to_string(path)?)?
        }
        None => RawConfig::default(),
    };

    let mut errors = apply_env(&mut raw, lookup);
    errors.extend(validate_config(&raw));
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(WatcherConfig::from_raw(raw))
}

/// Parse a TOML document without validating it
pub fn parse_config(content: &str) -> ConfigResult<RawConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_secret_is_fatal() {
        let result = load_config_with(None, no_env);
        match result {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(
                    errors,
                    vec![ValidationError::MissingRequired { key: env::SECRET }]
                );
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn environment_only() {
        let config = load_config_with(None, |key| match key {
            env::SECRET => Some("abc".into()),
            env::IDLE_TIMEOUT_MINUTES => Some("1".into()),
            env::MIN_UPTIME_MINUTES => Some("1".into()),
            env::POLL_INTERVAL_SECONDS => Some("10".into()),
            env::DRY_RUN => Some("true".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.endpoint.secret.expose(), "abc");
        assert_eq!(config.monitor.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.monitor.min_uptime, Duration::from_secs(60));
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(10));
        assert!(config.monitor.dry_run);
    }

    #[test]
    fn file_then_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            host = "mc.lan"
            secret = "from-file"
            poll_interval_seconds = 5
            shutdown_action = "poweroff"
            shutdown_command = "sudo -n poweroff"
            "#
        )
        .unwrap();

        let config = load_config_with(Some(file.path()), |key| match key {
            env::SECRET => Some("from-env".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.endpoint.host, "mc.lan");
        assert_eq!(config.endpoint.secret.expose(), "from-env");
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(5));
        assert_eq!(config.shutdown_action, ShutdownAction::PowerOff);
        assert_eq!(config.shutdown_command, vec!["sudo", "-n", "poweroff"]);
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config_with(Some(Path::new("/nonexistent/idlewatch.toml")), no_env);
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            parse_config("port = \"not a number\""),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn all_errors_reported_together() {
        let result = load_config_with(None, |key| match key {
            env::PORT => Some("x".into()),
            _ => None,
        });

        match result {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
