use std::{fmt, io};

use crate::error::service::ErrorInfo;

/// Crate-wide `Result` type using [`EsdumpError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, EsdumpError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum EsdumpError {
    /// Bad configuration or query reference.
    Config(ConfigError),

    /// Network or connection failure talking to the search service.
    Transport(TransportError),

    /// The search service reported a failure.
    Service(ServiceError),

    /// Output resource failure.
    Write(WriteError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Query reference file could not be read or parsed.
    InvalidQueryFile { path: String, reason: String },

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Search service protocol version not supported by this build.
    UnsupportedVersion(String),
}

/// Transport-level errors.
#[derive(Debug)]
pub enum TransportError {
    /// HTTP client could not be constructed.
    ClientBuild(String),

    /// Request could not be delivered or the response could not be read.
    RequestFailed { url: String, reason: String },

    /// No server addresses configured.
    NoServers,

    /// Response body was not valid JSON.
    InvalidResponse(String),
}

/// Errors reported by the search service itself.
#[derive(Debug)]
pub enum ServiceError {
    /// Non-success HTTP status with the decoded error body.
    Rejected {
        status: u16,
        info: ErrorInfo,
        /// Scroll id carried by the error body, if any.
        scroll_id: Option<String>,
    },
}

/// Output writer errors.
#[derive(Debug)]
pub enum WriteError {
    /// Output file could not be created.
    CreateFailed { path: String, reason: String },

    /// Writing a row failed.
    WriteFailed(String),

    /// Flushing buffered output failed.
    FlushFailed(String),

    /// Output directory does not exist.
    InvalidPath(String),
}

impl EsdumpError {
    /// Scroll id carried by a failed continuation response, if any.
    pub fn scroll_id(&self) -> Option<&str> {
        match self {
            EsdumpError::Service(ServiceError::Rejected {
                scroll_id: Some(id),
                ..
            }) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for EsdumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EsdumpError::Config(e) => write!(f, "Configuration error: {e}"),
            EsdumpError::Transport(e) => write!(f, "Transport error: {e}"),
            EsdumpError::Service(e) => write!(f, "Search service error: {e}"),
            EsdumpError::Write(e) => write!(f, "Write error: {e}"),
            EsdumpError::Io(e) => write!(f, "I/O error: {e}"),
            EsdumpError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidQueryFile { path, reason } => {
                write!(f, "Invalid query file '{path}': {reason}")
            }
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::UnsupportedVersion(version) => {
                write!(f, "Elasticsearch version is not supported: {version}")
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ClientBuild(msg) => write!(f, "Failed to build HTTP client: {msg}"),
            TransportError::RequestFailed { url, reason } => {
                write!(f, "Request to {url} failed: {reason}")
            }
            TransportError::NoServers => write!(f, "No Elasticsearch server configured"),
            TransportError::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Rejected { status, info, .. } => write!(f, "status {status}: {info}"),
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::CreateFailed { path, reason } => {
                write!(f, "Failed to create file {path}: {reason}")
            }
            WriteError::WriteFailed(msg) => write!(f, "Failed to write row: {msg}"),
            WriteError::FlushFailed(msg) => write!(f, "Failed to flush file: {msg}"),
            WriteError::InvalidPath(msg) => write!(f, "Directory does not exist: {msg}"),
        }
    }
}

impl std::error::Error for EsdumpError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TransportError {}
impl std::error::Error for ServiceError {}
impl std::error::Error for WriteError {}

/* ========================= Conversions to EsdumpError ========================= */

impl From<io::Error> for EsdumpError {
    fn from(err: io::Error) -> Self {
        EsdumpError::Io(err)
    }
}

impl From<reqwest::Error> for EsdumpError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        EsdumpError::Transport(TransportError::RequestFailed {
            url,
            reason: err.to_string(),
        })
    }
}

impl From<toml::de::Error> for EsdumpError {
    fn from(err: toml::de::Error) -> Self {
        EsdumpError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}

impl From<ConfigError> for EsdumpError {
    fn from(err: ConfigError) -> Self {
        EsdumpError::Config(err)
    }
}

impl From<TransportError> for EsdumpError {
    fn from(err: TransportError) -> Self {
        EsdumpError::Transport(err)
    }
}

impl From<ServiceError> for EsdumpError {
    fn from(err: ServiceError) -> Self {
        EsdumpError::Service(err)
    }
}

impl From<WriteError> for EsdumpError {
    fn from(err: WriteError) -> Self {
        EsdumpError::Write(err)
    }
}
