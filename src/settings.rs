//! Layered runtime configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config`, or `crowdwatch.toml` in the working directory if present)
//! 3. environment variables prefixed `CROWDWATCH_`, nested keys split on `__`
//!    (e.g. `CROWDWATCH_SERVER__API_URL`)
//! 4. command-line overrides
//!
//! ```toml
//! [server]
//! api_url = "http://localhost:5000"
//! stream_url = "http://localhost:5000"
//!
//! [auth]
//! token = "..."
//!
//! [session]
//! threshold = 0.65
//! history_capacity = 100
//! history_window_minutes = 60
//!
//! [transport]
//! reconnect_attempts = 5
//! reconnect_delay_ms = 1000
//!
//! [logging]
//! level = "info"
//! file = "crowdwatch.log"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::data::DEFAULT_HISTORY_CAPACITY;
use crate::session::DEFAULT_THRESHOLD;
use crate::transport::{RetryPolicy, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY};

/// File read when no explicit path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "crowdwatch.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CROWDWATCH";

/// Errors raised while assembling settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Values loaded but do not make sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Base URL of the REST API.
    pub api_url: String,
    /// Push channel endpoint: a Socket.IO server (`http://`, `https://`),
    /// or `ws://`, `wss://`, `tcp://`.
    pub stream_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            stream_url: "http://localhost:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub threshold: f64,
    pub history_capacity: usize,
    pub history_window_minutes: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_window_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Log file. Logging is off when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub transport: TransportSettings,
    pub logging: LoggingSettings,
}

/// Values given on the command line. `None` leaves lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub stream_url: Option<String>,
    pub token: Option<String>,
    pub threshold: Option<f64>,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Load from every layer, reading the process environment.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self, SettingsError> {
        Self::assemble(path, Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn assemble(
        path: Option<&Path>,
        env: Environment,
        overrides: Overrides,
    ) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = Config::builder().add_source(file).add_source(
            env.prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = apply_overrides(builder, overrides)?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.session.history_capacity == 0 {
            return Err(SettingsError::Invalid(
                "session.history_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.session.threshold) {
            return Err(SettingsError::Invalid(format!(
                "session.threshold must be within [0, 1], got {}",
                self.session.threshold
            )));
        }
        if self.server.stream_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "server.stream_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.transport.reconnect_attempts,
            delay: Duration::from_millis(self.transport.reconnect_delay_ms),
        }
    }
}

fn apply_overrides<St>(
    builder: ConfigBuilder<St>,
    overrides: Overrides,
) -> Result<ConfigBuilder<St>, SettingsError>
where
    St: config::builder::BuilderState,
{
    Ok(builder
        .set_override_option("server.api_url", overrides.api_url)?
        .set_override_option("server.stream_url", overrides.stream_url)?
        .set_override_option("auth.token", overrides.token)?
        .set_override_option("session.threshold", overrides.threshold)?
        .set_override_option(
            "logging.file",
            overrides
                .log_file
                .map(|path| path.to_string_lossy().into_owned()),
        )?)
}
