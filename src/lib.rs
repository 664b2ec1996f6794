//! esdump library
//!
//! Exports the results of an Elasticsearch query into a CSV file using the
//! scroll API, and releases every scroll context it opened.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `client`: Search-service client trait and HTTP implementation
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Scroll engine, result stream, writers and coordinator
//! - `query`: Query document compilation
//! - `utils`: Utility functions and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use esdump::{Config, ExportConfig, HttpSearchClient, ScrollEngine};
//! use esdump::export::{CsvWriter, ExportCoordinator, ProgressTracker};
//!
//! #[tokio::main]
//! async fn main() -> esdump::Result<()> {
//!     let config = Config::default();
//!     let client = Arc::new(HttpSearchClient::new(&config.connection)?);
//!
//!     let export = ExportConfig {
//!         fields: vec!["@timestamp".to_string(), "message".to_string()],
//!         match_all: vec!["level:error".to_string()],
//!         ..ExportConfig::default()
//!     };
//!     let writer = CsvWriter::create("errors.csv".as_ref(), export.fields.clone(), b',').await?;
//!     let engine = ScrollEngine::from_config(client, export)?;
//!
//!     let result = ExportCoordinator::new(engine, Box::new(writer), ProgressTracker::new(true))
//!         .execute()
//!         .await?;
//!     println!("Exported {} documents", result.documents_exported);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod query;
pub mod utils;

// Re-export commonly used types
pub use client::{HttpSearchClient, SearchClient};
pub use config::{Config, ExportConfig, OutputConfig};
pub use error::{EsdumpError, Result};
pub use export::{ExportCoordinator, ExportResult, ScrollEngine};
pub use query::{QueryDocument, build_query};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
