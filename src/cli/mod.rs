//! Command-line interface for esdump
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Building the export and output settings for a session

use chrono::{DateTime, Duration as ChronoDuration, Local, SecondsFormat};
use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, ExportConfig, LogLevel, OutputConfig};
use crate::error::{ConfigError, Result};

/// The only search API version this tool speaks
pub const SUPPORTED_ES_VERSION: &str = "v7";

/// esdump - export Elasticsearch query results into a CSV file
#[derive(Parser, Debug)]
#[command(
    name = "esdump",
    version,
    disable_version_flag = true,
    about = "A CLI tool for exporting data from Elasticsearch into a file",
    long_about = "Runs a scroll search against Elasticsearch and writes the selected
fields of every hit as one CSV row. Scroll contexts are released when the
export finishes, fails or is interrupted."
)]
pub struct CliArgs {
    /// Query in Lucene syntax, or @FILE to load a JSON query body
    #[arg(short = 'q', long, value_name = "QUERY")]
    pub query: Option<String>,

    /// <field>:<value> pairs to match (repeatable)
    #[arg(short = 'm', long = "match-all", value_name = "FIELD:VALUE")]
    pub match_all: Vec<String>,

    /// CSV file location
    #[arg(short = 'o', long = "output-file", value_name = "FILE")]
    pub output_file: PathBuf,

    /// Elasticsearch host URL (repeatable or comma separated)
    #[arg(short = 'e', long = "es-server", value_name = "URL", value_delimiter = ',')]
    pub es_server: Vec<String>,

    /// Basic authentication in the form of username:password
    #[arg(short = 'a', long, value_name = "USER:PASS")]
    pub auth: Option<String>,

    /// Elasticsearch version
    #[arg(short = 'E', long = "es-version", value_name = "VERSION")]
    pub es_version: Option<String>,

    /// Index name prefix(es) (repeatable or comma separated)
    #[arg(short = 'i', long = "index-prefixes", value_name = "INDEX", value_delimiter = ',')]
    pub index_prefixes: Vec<String>,

    /// Fields selected in output, in column order
    #[arg(short = 'f', long, value_name = "FIELD", value_delimiter = ',', required = true)]
    pub fields: Vec<String>,

    /// <field>:<asc|desc> pairs to sort on
    #[arg(short = 's', long, value_name = "FIELD:DIRECTION", value_delimiter = ',')]
    pub sort: Vec<String>,

    /// Maximum number of hits returned per page
    #[arg(short = 'p', long = "page-size", value_name = "N")]
    pub page_size: Option<usize>,

    /// Scroll context keep-alive (e.g. 30s, 5m, 1h)
    #[arg(short = 'S', long = "scroll-size", value_name = "DURATION")]
    pub scroll_size: Option<String>,

    /// Field the range filter applies to
    #[arg(short = 'R', long = "range-field", value_name = "FIELD")]
    pub range_field: Option<String>,

    /// Range bounds: lower (inclusive) then upper (exclusive)
    #[arg(short = 'V', long = "range-value", value_name = "VALUE")]
    pub range_value: Vec<String>,

    /// Request body in the Query DSL, sent verbatim
    #[arg(short = 'r', long = "raw-query", value_name = "JSON")]
    pub raw_query: Option<String>,

    /// Ignore non-fatal scroll errors
    #[arg(
        short = 'n',
        long = "ignore-err",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub ignore_err: Option<bool>,

    /// Debug mode (logs compiled queries and responses)
    #[arg(long)]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(long)]
    pub quiet: bool,

    /// Show a progress spinner on stderr
    #[arg(long)]
    pub progress: bool,

    /// Output field delimiter (single character, `\t` for tab)
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    pub version: Option<bool>,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration, with arguments applied
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Merged and validated configuration
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        Self::apply_args_to_config(&mut config, args);
        config.validate()?;

        if config.connection.es_version != SUPPORTED_ES_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.connection.es_version.clone()).into());
        }

        Ok(config)
    }

    /// Get the merged configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Build the export settings for this session
    ///
    /// Range bounds default to the last 24 hours when none are given.
    ///
    /// # Returns
    /// * `Result<ExportConfig>` - Export settings or error
    pub fn export_config(&self) -> Result<ExportConfig> {
        let defaults = &self.config.export;
        let range_values = if self.args.range_value.is_empty() {
            default_range_values(Local::now())
        } else {
            self.args.range_value.clone()
        };

        Ok(ExportConfig {
            query: self.args.query.clone().unwrap_or_default(),
            raw_query: self.args.raw_query.clone().unwrap_or_default(),
            indices: defaults.indices.clone(),
            match_all: self.args.match_all.clone(),
            fields: self.args.fields.clone(),
            sort: self.args.sort.clone(),
            range_field: defaults.range_field.clone(),
            range_values,
            page_size: defaults.page_size,
            scroll: self.config.scroll_duration()?,
            ignore_errors: defaults.ignore_errors,
            max_scroll_errors: defaults.max_scroll_errors,
            debug: self.args.debug,
        })
    }

    /// Build the output settings for this session
    pub fn output_config(&self) -> Result<OutputConfig> {
        Ok(OutputConfig {
            path: self.args.output_file.clone(),
            delimiter: self.config.delimiter()?,
            progress: self.args.progress,
        })
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_connection_args(config, args);
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
    }

    /// Apply connection-related CLI arguments to configuration
    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if !args.es_server.is_empty() {
            config.connection.servers = args.es_server.clone();
        }
        if let Some(auth) = &args.auth {
            config.connection.auth = Some(auth.clone());
        }
        if let Some(version) = &args.es_version {
            config.connection.es_version = version.clone();
        }
    }

    /// Apply export-related CLI arguments to configuration
    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        let export = &mut config.export;

        if !args.index_prefixes.is_empty() {
            export.indices = args.index_prefixes.clone();
        }
        if let Some(page_size) = args.page_size {
            export.page_size = page_size;
        }
        if let Some(scroll) = &args.scroll_size {
            export.scroll = scroll.clone();
        }
        if let Some(field) = &args.range_field {
            export.range_field = field.clone();
        }
        if let Some(ignore) = args.ignore_err {
            export.ignore_errors = ignore;
        }
        if let Some(delimiter) = &args.delimiter {
            export.delimiter = delimiter.clone();
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.debug || args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }
}

/// Range bounds covering the 24 hours before `now`
fn default_range_values(now: DateTime<Local>) -> Vec<String> {
    let start = now - ChronoDuration::hours(24);
    vec![
        start.to_rfc3339_opts(SecondsFormat::Nanos, true),
        now.to_rfc3339_opts(SecondsFormat::Nanos, true),
    ]
}
