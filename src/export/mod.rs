//! Export module for streaming scroll results to disk
//!
//! # Architecture
//!
//! An export session is built from four components:
//!
//! 1. **ScrollEngine**: opens a scroll context, walks every page and
//!    releases all scroll ids it saw
//! 2. **DocumentSender / DocumentReceiver**: a bounded single-slot stream
//!    between the engine and the consumer
//! 3. **RecordWriter**: turns each document into one output row
//! 4. **ProgressTracker**: optional spinner on stderr
//!
//! The **ExportCoordinator** spawns the engine, drains the stream into the
//! writer and collects the final statistics.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use esdump::client::HttpSearchClient;
//! use esdump::config::{ConnectionConfig, ExportConfig};
//! use esdump::export::{CsvWriter, ExportCoordinator, ProgressTracker, ScrollEngine};
//!
//! # async fn run() -> esdump::Result<()> {
//! let client = Arc::new(HttpSearchClient::new(&ConnectionConfig::default())?);
//! let config = ExportConfig {
//!     fields: vec!["host".to_string(), "message".to_string()],
//!     ..ExportConfig::default()
//! };
//! let fields = config.fields.clone();
//! let engine = ScrollEngine::from_config(client, config)?;
//! let writer = CsvWriter::create("dump.csv".as_ref(), fields, b',').await?;
//!
//! let result = ExportCoordinator::new(engine, Box::new(writer), ProgressTracker::new(false))
//!     .execute()
//!     .await?;
//! println!("{} rows", result.documents_exported);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod document;
pub mod progress;
pub mod scroll;
pub mod stream;
pub mod writers;

pub use coordinator::{ExportCoordinator, ExportResult};
pub use document::Document;
pub use progress::ProgressTracker;
pub use scroll::{CursorChain, DumpSummary, ScrollEngine};
pub use stream::{DocumentReceiver, DocumentSender};
pub use writers::{CsvWriter, RecordWriter};
