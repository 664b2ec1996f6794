//! CSV writer for export operations
//!
//! Each document becomes one row whose columns follow the selected field
//! list. There is no header row. Values containing the delimiter, a quote,
//! a line break or leading whitespace are quoted, with embedded quotes
//! doubled.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{EsdumpError, Result, WriteError};

use crate::export::document::Document;
use super::{RecordWriter, create_writer};

/// Writer for CSV format
pub struct CsvWriter<W = BufWriter<File>> {
    /// Output sink
    writer: W,
    /// Selected fields, in column order
    fields: Vec<String>,
    /// Field delimiter
    delimiter: u8,
    /// Number of rows written
    written: u64,
    /// Whether close has run
    closed: bool,
}

impl CsvWriter<BufWriter<File>> {
    /// Create a CSV writer backed by a new file
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `fields` - Selected fields, in column order
    /// * `delimiter` - Field delimiter
    pub async fn create(path: &Path, fields: Vec<String>, delimiter: u8) -> Result<Self> {
        let writer = create_writer(path).await?;
        debug!("Created CSV writer for: {}", path.display());
        Ok(Self::from_writer(writer, fields, delimiter))
    }
}

impl<W> CsvWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a CSV writer over any async sink
    pub fn from_writer(writer: W, fields: Vec<String>, delimiter: u8) -> Self {
        Self {
            writer,
            fields,
            delimiter,
            written: 0,
            closed: false,
        }
    }

    /// Borrow the underlying sink
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Render one document as a row, without the line terminator
    fn render_row(&self, doc: &Document) -> String {
        let delimiter = char::from(self.delimiter);
        let mut row = String::new();

        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                row.push(delimiter);
            }
            let value = doc.get_scalar(field).unwrap_or_default();
            row.push_str(&escape_csv_value(&value, self.delimiter));
        }

        row
    }
}

/// Escape a CSV value if necessary
///
/// # Arguments
/// * `value` - Value to escape
/// * `delimiter` - Field delimiter in use
///
/// # Returns
/// * `String` - Escaped value
fn escape_csv_value(value: &str, delimiter: u8) -> String {
    let needs_quotes = value.contains(char::from(delimiter))
        || value.contains(['"', '\n', '\r'])
        || value.starts_with(char::is_whitespace);

    if needs_quotes {
        // Wrap in quotes and escape internal quotes by doubling them
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl<W> RecordWriter for CsvWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, doc: &Document) -> Result<()> {
        if self.closed {
            return Err(WriteError::WriteFailed("writer already closed".to_string()).into());
        }

        let mut row = self.render_row(doc);
        row.push('\n');
        self.writer
            .write_all(row.as_bytes())
            .await
            .map_err(|e| EsdumpError::from(WriteError::WriteFailed(e.to_string())))?;

        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.writer
            .flush()
            .await
            .map_err(|e| EsdumpError::from(WriteError::FlushFailed(e.to_string())))?;

        debug!("Closed CSV writer ({} rows)", self.written);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl<W> Drop for CsvWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("CsvWriter dropped without close, buffered rows may be lost");
        }
    }
}
