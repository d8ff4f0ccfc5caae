//! Application configuration loading, validation, and management.
//!
//! This module provides the top-level `Config` structure that aggregates
//! the polling schedule, the list of monitored servers, the metrics bind
//! host, and the logging configuration. It handles loading from YAML files,
//! environment overrides, and validation.
//!
//! The configuration is loaded early in the application lifecycle and is
//! intended to remain immutable thereafter.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::logger::LoggerConfig;

pub mod logger;

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors that can occur during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the YAML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// A single monitored game server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Server {
    /// Display name used as the metric label when the status response does
    /// not supply one. May be empty, in which case `ip:port` is used.
    pub name: String,

    /// Host of the server. DNS name or literal IP.
    #[validate(length(min = 1, message = "Server ip must not be empty"))]
    pub ip: String,

    /// Query port of the server.
    #[validate(range(min = 1, max = 65535, message = "Port must be in 1..=65535"))]
    pub port: u32,

    /// When true, the effective host at poll time is taken from the address
    /// resolver instead of `ip`.
    pub override_ip: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            name: String::new(),
            ip: String::new(),
            port: 0,
            override_ip: false,
        }
    }
}

impl Server {
    /// Label used to identify this server in logs and failure metrics.
    /// Falls back to the `ip:port` form when no name is configured.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.to_string()
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// Interval between poll cycles, in seconds. Shared by all servers.
    ///
    /// Must be at least 30 seconds to avoid overloading the remote query API.
    #[validate(range(min = 30, message = "interval must be at least 30 seconds"))]
    pub interval: u64,

    /// Bind address for the metrics endpoint (e.g. "0.0.0.0").
    #[validate(length(min = 1, message = "host is required"))]
    pub host: String,

    /// Servers to poll. At least one must be configured.
    #[validate(
        length(min = 1, message = "At least one server must be configured"),
        nested
    )]
    pub servers: Vec<Server>,

    /// Logging subsystem configuration.
    pub logger: LoggerConfig,
}

impl Config {
    /// Constructs a new configuration by locating and loading the config file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration file cannot be found,
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `GSMON_CONFIG` environment variable
    /// 2. `/etc/gsmon/config.yaml`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Config` if no suitable file is found.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var("GSMON_CONFIG") {
            let path = PathBuf::from(config_path);
            print_info!("Using config from GSMON_CONFIG: {}", path.display());
            return Ok(path);
        }

        let fallback = Path::new("/etc/gsmon/config.yaml");
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "No configuration file found.".to_string(),
        ))
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(path.to_string_lossy().to_string()));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::from_yaml(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration from a YAML string.
    pub fn from_yaml(s: &str) -> Result<Config, ConfigError> {
        let config: Config =
            serde_yaml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }

    /// True when any configured server relies on the address resolver.
    pub fn needs_resolver(&self) -> bool {
        self.servers.iter().any(|s| s.override_ip)
    }
}
