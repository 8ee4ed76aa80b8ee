//! Configuration management for wavetap-ap
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (`--port`, `--delivery`, `--autoplay`)
//! 2. Environment variables (`WAVETAP_PORT`, `WAVETAP_CONFIG`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! The TOML file is bootstrap-only: the service must restart to pick up
//! changes.

use crate::audio::SampleScale;
use crate::error::{Error, Result};
use crate::playback::{DeliveryMode, SessionSettings};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use wavetap_common::config::{load_toml, resolve_config_path};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "WAVETAP_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Every key is optional.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// `pull` or `push`
    #[serde(default)]
    pub sample_delivery_mode: DeliveryMode,

    /// Start playback as soon as a source is bound
    #[serde(default)]
    pub autoplay_on_set_source: bool,

    /// `raw` or `normalized`
    #[serde(default)]
    pub sample_scale: SampleScale,

    /// Events buffered per SSE subscriber before it starts lagging
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    5750
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            sample_delivery_mode: DeliveryMode::default(),
            autoplay_on_set_source: false,
            sample_scale: SampleScale::default(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Resolve and load the config file, or fall back to defaults when none
    /// exists
    ///
    /// An explicitly named file (CLI or environment) that cannot be read is
    /// an error rather than a silent fallback.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            Some(path) => {
                let config: TomlConfig = load_toml(&path)?;
                config.validate()?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse from a TOML string (tests and embedding hosts)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub delivery: Option<DeliveryMode>,
    pub autoplay: bool,
}

/// Effective service configuration after merging every source
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub session: SessionSettings,
    pub event_capacity: usize,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI overrides over a loaded TOML config
    pub fn resolve(toml: TomlConfig, cli: &CliOverrides) -> Self {
        let port = cli.port.unwrap_or(toml.port);
        Self {
            listen_addr: SocketAddr::new(toml.bind_address, port),
            session: SessionSettings {
                delivery_mode: cli.delivery.unwrap_or(toml.sample_delivery_mode),
                autoplay_on_set_source: cli.autoplay || toml.autoplay_on_set_source,
                sample_scale: toml.sample_scale,
            },
            event_capacity: toml.event_capacity,
            log_level: toml.logging.level,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), &CliOverrides::default())
    }
}
