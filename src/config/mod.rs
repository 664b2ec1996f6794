//! Configuration management for esdump
//!
//! This module handles loading, parsing, and managing configuration from:
//! - Configuration files (TOML format)
//! - Command-line arguments (applied by the `cli` module)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values
//!
//! The file configuration ([`Config`]) only carries defaults. The export
//! pipeline itself reads a fully populated [`ExportConfig`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::utils::time::parse_duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export defaults
    #[serde(default)]
    pub export: ExportDefaults,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search-service connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Elasticsearch host URLs, tried in order
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Basic authentication in the form `username:password`
    #[serde(default)]
    pub auth: Option<String>,

    /// Elasticsearch protocol version
    #[serde(default = "default_es_version")]
    pub es_version: String,

    /// Whole-request timeout in seconds. Unset means requests are only
    /// bounded by the scroll keep-alive on the service side.
    #[serde(default)]
    pub request_timeout: Option<u64>,
}

/// Export defaults that the command line may override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Index names or patterns
    #[serde(default = "default_indices")]
    pub indices: Vec<String>,

    /// Maximum number of hits per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Scroll keep-alive (e.g. "5m")
    #[serde(default = "default_scroll")]
    pub scroll: String,

    /// Field used for the range filter
    #[serde(default = "default_range_field")]
    pub range_field: String,

    /// Keep scrolling after a failed continuation request
    #[serde(default = "default_ignore_errors")]
    pub ignore_errors: bool,

    /// Consecutive tolerated continuation failures before giving up
    #[serde(default = "default_max_scroll_errors")]
    pub max_scroll_errors: u32,

    /// Output field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Fully resolved configuration for one export session.
///
/// Built by the caller and read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Query source: `@path` references a JSON query file; any other
    /// non-empty text is passed through as a query-string clause
    pub query: String,

    /// Raw request body, used verbatim when non-empty
    pub raw_query: String,

    /// Index names or patterns
    pub indices: Vec<String>,

    /// `field:value` match filters
    pub match_all: Vec<String>,

    /// Selected output fields, in column order
    pub fields: Vec<String>,

    /// `field:direction` sort directives
    pub sort: Vec<String>,

    /// Field used for the range filter
    pub range_field: String,

    /// Inclusive lower bound, then exclusive upper bound
    pub range_values: Vec<String>,

    /// Maximum number of hits per page
    pub page_size: usize,

    /// Scroll keep-alive sent with every request
    pub scroll: Duration,

    /// Keep scrolling after a failed continuation request
    pub ignore_errors: bool,

    /// Consecutive tolerated continuation failures before giving up
    pub max_scroll_errors: u32,

    /// Verbose diagnostics
    pub debug: bool,
}

/// Output sink configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// CSV file location
    pub path: PathBuf,

    /// Field delimiter
    pub delimiter: u8,

    /// Show a progress spinner while exporting
    pub progress: bool,
}

// Default value functions
fn default_servers() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_es_version() -> String {
    "v7".to_string()
}

fn default_indices() -> Vec<String> {
    vec!["log-*".to_string()]
}

fn default_page_size() -> usize {
    1000
}

fn default_scroll() -> String {
    "5m".to_string()
}

fn default_range_field() -> String {
    "@timestamp".to_string()
}

fn default_ignore_errors() -> bool {
    true
}

fn default_max_scroll_errors() -> u32 {
    3
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            auth: None,
            es_version: default_es_version(),
            request_timeout: None,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            indices: default_indices(),
            page_size: default_page_size(),
            scroll: default_scroll(),
            range_field: default_range_field(),
            ignore_errors: default_ignore_errors(),
            max_scroll_errors: default_max_scroll_errors(),
            delimiter: default_delimiter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        let defaults = ExportDefaults::default();
        Self {
            query: String::new(),
            raw_query: String::new(),
            indices: defaults.indices,
            match_all: Vec::new(),
            fields: Vec::new(),
            sort: Vec::new(),
            range_field: defaults.range_field,
            range_values: Vec::new(),
            page_size: defaults.page_size,
            scroll: Duration::from_secs(300),
            ignore_errors: defaults.ignore_errors,
            max_scroll_errors: defaults.max_scroll_errors,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Explicit config path; `None` uses [`Config::default_path`]
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration. A missing default file
    ///   yields the defaults, a missing explicit file is an error.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.esdump/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".esdump")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.connection.servers.is_empty() {
            return Err(ConfigError::MissingField("connection.servers".to_string()).into());
        }
        if self.export.page_size == 0 {
            return Err(invalid("export.page_size", "0"));
        }
        self.scroll_duration()?;
        self.delimiter()?;
        Ok(())
    }

    /// Get the configured scroll keep-alive as Duration
    pub fn scroll_duration(&self) -> Result<Duration> {
        parse_duration(&self.export.scroll).ok_or_else(|| invalid("export.scroll", &self.export.scroll))
    }

    /// Get the configured delimiter as a single byte
    pub fn delimiter(&self) -> Result<u8> {
        parse_delimiter(&self.export.delimiter)
            .ok_or_else(|| invalid("export.delimiter", &self.export.delimiter))
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Parse a single-byte ASCII delimiter (`\t` accepted as an escape).
pub fn parse_delimiter(s: &str) -> Option<u8> {
    match s {
        "\\t" => Some(b'\t'),
        _ => match s.as_bytes() {
            [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Some(*b),
            _ => None,
        },
    }
}

fn invalid(field: &str, value: &str) -> crate::error::EsdumpError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
