//! Client configuration using Figment.
//!
//! Configuration is layered, each layer overriding the previous one:
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file (default `config/fsmaster-client.toml`, optional)
//! 3. Environment variables prefixed with `FSMASTER_`
//!
//! Nested fields use double underscores:
//!
//! - `FSMASTER_CLIENT__MAX_RETRIES=30` sets `client.max_retries`
//! - `FSMASTER_CLIENT__BACKOFF__STRATEGY=fixed` selects fixed backoff
//! - `FSMASTER_LOGGING__LEVEL=debug` sets `logging.level`
//!
//! Settings are read once. The [`ClientConfig`] handed to a client is owned by
//! it and never mutated afterwards.
//!
//! # Example
//! ```no_run
//! use fsmaster_client::config::Settings;
//!
//! let settings = Settings::load(None)?;
//! println!("max retries: {}", settings.client.max_retries);
//! # Ok::<(), fsmaster_client::ClientError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/fsmaster-client.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "FSMASTER_";

/// Retry behavior of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retries allowed after the first attempt of an operation.
    ///
    /// Attempts `0..=max_retries` are made, so `0` means a single try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay strategy between attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Delay strategy applied between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Same delay before every retry.
    Fixed {
        /// Wait before each retry.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `base_delay * multiplier^(n-1)` before retry `n`, capped at `max_delay`.
    Exponential {
        /// Wait before the first retry.
        #[serde(with = "humantime_serde", default = "default_base_delay")]
        base_delay: Duration,
        /// Upper bound on the computed wait.
        #[serde(with = "humantime_serde", default = "default_max_delay")]
        max_delay: Duration,
        /// Growth factor between retries.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        /// Add up to 25% random extra delay.
        #[serde(default = "default_jitter")]
        jitter: bool,
    },
}

// Default value functions
fn default_max_retries() -> u32 {
    100
}

fn default_base_delay() -> Duration {
    Duration::from_millis(50)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Fixed backoff with the given delay.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        BackoffConfig::Fixed { delay }
    }

    /// Exponential backoff without jitter, doubling from `base_delay` up to `max_delay`.
    #[must_use]
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        BackoffConfig::Exponential {
            base_delay,
            max_delay,
            multiplier: default_multiplier(),
            jitter: false,
        }
    }

    /// Smallest delay this strategy can produce before a retry.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        match self {
            BackoffConfig::Fixed { delay } => *delay,
            BackoffConfig::Exponential { base_delay, .. } => *base_delay,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            BackoffConfig::Fixed { delay } => {
                if delay.is_zero() {
                    return Err(ClientError::InvalidConfig(
                        "backoff.delay must be greater than zero".into(),
                    ));
                }
            }
            BackoffConfig::Exponential {
                base_delay,
                max_delay,
                multiplier,
                ..
            } => {
                if base_delay.is_zero() {
                    return Err(ClientError::InvalidConfig(
                        "backoff.base_delay must be greater than zero".into(),
                    ));
                }
                if base_delay > max_delay {
                    return Err(ClientError::InvalidConfig(format!(
                        "backoff.base_delay ({:?}) exceeds backoff.max_delay ({:?})",
                        base_delay, max_delay
                    )));
                }
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(ClientError::InvalidConfig(format!(
                        "backoff.multiplier must be a finite value >= 1.0, got {}",
                        multiplier
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config with `max_retries` and a fixed `delay`.
    #[must_use]
    pub fn with_fixed_backoff(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffConfig::fixed(delay),
        }
    }

    /// Check values that parse but cannot drive a retry loop.
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }
}

/// Logging section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Client retry settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from defaults, an optional TOML file, and `FSMASTER_` env vars.
    ///
    /// `config_path` defaults to [`DEFAULT_CONFIG_PATH`]. A missing file is not
    /// an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if a layer cannot be parsed and
    /// [`ClientError::InvalidConfig`] if validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if file_path.exists() {
            figment = figment.merge(Toml::file(&file_path));
        } else {
            tracing::warn!(
                path = %file_path.display(),
                "Config file not found, using defaults and environment"
            );
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Parse settings from a TOML string layered over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)),
        )
    }

    fn extract(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ClientError::InvalidConfig(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ClientError::InvalidConfig(format!(
                "Invalid logging.format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}
