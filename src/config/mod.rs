//! Configuration management for Pathwarden.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adversary::{AdversaryConfig, AdversaryKind};
use crate::error::{Error, Result};
use crate::probe::ProbeConfig;
use crate::transport::BindingConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Binding configuration.
    #[serde(default)]
    pub binding: BindingConfig,

    /// Adversary selection.
    #[serde(default)]
    pub adversary: AdversaryConfig,

    /// Path probing configuration.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.probe.deadline.is_zero() {
            return Err(Error::InvalidConfig("probe deadline must be non-zero".into()));
        }
        if self.binding.recv_buffer_size == 0 {
            return Err(Error::InvalidConfig("receive buffer size must be non-zero".into()));
        }
        self.adversary.validate()
    }

    /// Default config path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("pathwarden.toml")
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            binding: BindingConfig {
                port: 51820,
                ..Default::default()
            },
            adversary: AdversaryConfig {
                kind: AdversaryKind::AllButOne,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

impl LoggingConfig {
    /// Apply command-line overrides on top of the configured values.
    pub fn with_overrides(mut self, level: Option<String>, no_color: bool) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if no_color {
            self.color = false;
        }
        self
    }
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
