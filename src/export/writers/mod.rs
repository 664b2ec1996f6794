//! Record writers for export operations
//!
//! A record writer turns one document at a time into an output row. It
//! owns its output resource from construction until [`RecordWriter::close`],
//! which must flush buffered content. The export coordinator calls `close`
//! on every exit path.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::error::{Result, WriteError};

use super::document::Document;

pub mod csv;

pub use csv::CsvWriter;

/// Trait for writing documents as output rows
#[async_trait]
pub trait RecordWriter: Send {
    /// Write one document as one row
    ///
    /// # Arguments
    /// * `doc` - Document to render
    async fn write(&mut self, doc: &Document) -> Result<()>;

    /// Flush buffered output and release the resource
    ///
    /// Calling `close` more than once is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Number of rows written so far
    fn written(&self) -> u64;
}

/// Helper function to create a buffered file writer
///
/// # Arguments
/// * `path` - File path to create
///
/// # Returns
/// * `Result<BufWriter<File>>` - Buffered writer or error
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    validate_path(path)?;
    let file = File::create(path).await.map_err(|e| WriteError::CreateFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file)) // 1MB buffer
}

/// Helper function to validate that the parent directory exists
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(WriteError::InvalidPath(parent.display().to_string()).into());
        }
    }

    Ok(())
}
