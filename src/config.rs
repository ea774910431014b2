use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::error::{ControllerError, ControllerResult};
use crate::models::ContainerConfig;

pub const DEFAULT_CLI_PATH: &str = "/usr/local/bin/robotgo-cli";
pub const DEFAULT_RELEASE_URL: &str =
    "https://github.com/sampagon/robotgo-cli/releases/latest/download/robotgo-cli";

/// Process-level settings for the controller and the Docker connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub docker_host: String,

    // Remote-control binary
    pub cli_path: String,
    pub release_url: String,
    pub skip_bootstrap: bool,

    // Timeouts
    pub start_timeout_seconds: u64,
    pub start_poll_interval_ms: u64,
    pub stop_timeout_seconds: u64,
    pub exec_timeout_seconds: u64,

    pub remove_on_stop: bool,

    // Audit & logging
    pub enable_audit_log: bool,
    pub audit_log_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_host: "unix:///var/run/docker.sock".to_string(),

            cli_path: DEFAULT_CLI_PATH.to_string(),
            release_url: DEFAULT_RELEASE_URL.to_string(),
            skip_bootstrap: false,

            start_timeout_seconds: 60,
            start_poll_interval_ms: 500,
            stop_timeout_seconds: 10,
            exec_timeout_seconds: 30,

            // Desktop containers keep user config in volumes; stopping is enough
            remove_on_stop: false,

            enable_audit_log: false,
            audit_log_path: "./logs/actions.log".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> ControllerResult<Self> {
        dotenvy::dotenv().ok();

        let mut settings = Settings::default();

        if let Ok(docker_host) = env::var("DOCKER_HOST") {
            settings.docker_host = docker_host;
        }

        if let Ok(path) = env::var("ROBOTGO_CLI_PATH") {
            settings.cli_path = path;
        }

        if let Ok(url) = env::var("ROBOTGO_RELEASE_URL") {
            settings.release_url = url;
        }

        if let Ok(skip) = env::var("SKIP_BOOTSTRAP") {
            settings.skip_bootstrap = parse_var("SKIP_BOOTSTRAP", &skip)?;
        }

        if let Ok(timeout) = env::var("START_TIMEOUT_SECONDS") {
            settings.start_timeout_seconds = parse_var("START_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(interval) = env::var("START_POLL_INTERVAL_MS") {
            settings.start_poll_interval_ms = parse_var("START_POLL_INTERVAL_MS", &interval)?;
        }

        if let Ok(timeout) = env::var("STOP_TIMEOUT_SECONDS") {
            settings.stop_timeout_seconds = parse_var("STOP_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(timeout) = env::var("EXEC_TIMEOUT_SECONDS") {
            settings.exec_timeout_seconds = parse_var("EXEC_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(remove) = env::var("REMOVE_ON_STOP") {
            settings.remove_on_stop = parse_var("REMOVE_ON_STOP", &remove)?;
        }

        if let Ok(audit) = env::var("ENABLE_AUDIT_LOG") {
            settings.enable_audit_log = parse_var("ENABLE_AUDIT_LOG", &audit)?;
        }

        if let Ok(audit_path) = env::var("AUDIT_LOG_PATH") {
            settings.audit_log_path = audit_path;
        }

        settings.check()?;
        Ok(settings)
    }

    pub(crate) fn check(&self) -> ControllerResult<()> {
        if self.cli_path.trim().is_empty() {
            return Err(ControllerError::Configuration(
                "cli_path must not be empty".to_string(),
            ));
        }
        if self.start_timeout_seconds == 0 {
            return Err(ControllerError::Configuration(
                "start_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.exec_timeout_seconds == 0 {
            return Err(ControllerError::Configuration(
                "exec_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if i32::try_from(self.stop_timeout_seconds).is_err() {
            return Err(ControllerError::Configuration(format!(
                "stop_timeout_seconds out of range: {}",
                self.stop_timeout_seconds
            )));
        }
        if self.start_poll_interval_ms == 0 {
            return Err(ControllerError::Configuration(
                "start_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_seconds)
    }

    pub fn start_poll_interval(&self) -> Duration {
        Duration::from_millis(self.start_poll_interval_ms)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_seconds)
    }
}

fn parse_var<T>(name: &str, value: &str) -> ControllerResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::Configuration(format!("Invalid {}: {}", name, e)))
}

impl ContainerConfig {
    /// Load a container profile (TOML, YAML or JSON, by extension) and overlay
    /// `DESKTOP__`-prefixed environment variables, e.g. `DESKTOP__IMAGE`.
    pub fn from_file(path: impl AsRef<Path>) -> ControllerResult<Self> {
        let path = path.as_ref();

        let source = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("DESKTOP").separator("__"))
            .build()
            .map_err(|e| {
                ControllerError::Configuration(format!(
                    "Failed to read profile {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let profile: ContainerConfig = source.try_deserialize().map_err(|e| {
            ControllerError::Configuration(format!("Invalid profile {}: {}", path.display(), e))
        })?;

        profile.validate()?;
        Ok(profile)
    }
}
