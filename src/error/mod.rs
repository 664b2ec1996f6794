//! Error handling module for export operations.
//!
//! This module provides error handling for the export pipeline with:
//! - A small taxonomy matching the pipeline phases (config, transport,
//!   service, write)
//! - Structured error information extracted from search-service error bodies
//! - A crate-wide `Result` alias
//!
//! # Example
//!
//! ```rust,no_run
//! use esdump::error::{EsdumpError, ServiceError};
//! use esdump::error::service::ErrorInfo;
//!
//! fn rejected(status: u16, body: &serde_json::Value) -> EsdumpError {
//!     ServiceError::Rejected {
//!         status,
//!         info: ErrorInfo::from_body(body),
//!         scroll_id: None,
//!     }
//!     .into()
//! }
//! ```

pub mod kinds;
pub mod service;

// Re-export commonly used types
pub use kinds::{
    ConfigError, EsdumpError, Result, ServiceError, TransportError, WriteError,
};
pub use service::ErrorInfo;
