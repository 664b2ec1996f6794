//! Export coordinator for orchestrating export sessions
//!
//! Runs the scroll engine as a producer task and drains the result stream
//! into a record writer in the caller's flow. The writer is closed on every
//! exit path, including write failures; a failed writer drops the stream,
//! which stops the producer and lets it release its cursors.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{EsdumpError, Result};

use super::progress::ProgressTracker;
use super::scroll::ScrollEngine;
use super::stream::{self, DocumentReceiver};
use super::writers::RecordWriter;

/// Rows between periodic progress log lines
const LOG_EVERY: u64 = 10_000;

/// Result of an export operation
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Number of documents written
    pub documents_exported: u64,
    /// Total hits reported by the search service
    pub total_hits: Option<u64>,
    /// Number of scroll contexts opened during the session
    pub cursors: usize,
    /// Time taken for export
    pub elapsed_ms: u64,
    /// Whether the export was cancelled
    pub cancelled: bool,
}

/// Coordinator for export operations
pub struct ExportCoordinator {
    /// Producer of documents
    engine: ScrollEngine,
    /// Output sink
    writer: Box<dyn RecordWriter>,
    /// Progress tracker for user feedback
    tracker: ProgressTracker,
    /// Cancellation token for aborting export
    cancel_token: CancellationToken,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(engine: ScrollEngine, writer: Box<dyn RecordWriter>, tracker: ProgressTracker) -> Self {
        Self {
            engine,
            writer,
            tracker,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Execute the export session
    ///
    /// 1. Spawn the scroll engine with a fresh result stream
    /// 2. Write every streamed document
    /// 3. Close the writer, whatever happened
    /// 4. Wait for the engine, which releases its cursors
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Export statistics, or the first fatal
    ///   error. Rows already written stay in the output.
    pub async fn execute(self) -> Result<ExportResult> {
        let Self {
            engine,
            mut writer,
            tracker,
            cancel_token,
        } = self;

        let start_time = Instant::now();
        info!("Starting export operation");

        let (tx, rx) = stream::channel();
        let producer = tokio::spawn(engine.dump(cancel_token, tx));

        let drained = drain(rx, writer.as_mut(), &tracker).await;

        debug!("Closing writer after {} rows", writer.written());
        let closed = writer.close().await;
        tracker.finish();

        let summary = producer
            .await
            .map_err(|e| EsdumpError::Generic(format!("Export task failed: {e}")))??;
        let exported = drained?;
        closed?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Export completed: {} documents, {} ms{}",
            exported,
            elapsed_ms,
            if summary.cancelled { " (cancelled)" } else { "" }
        );

        Ok(ExportResult {
            documents_exported: exported,
            total_hits: summary.total,
            cursors: summary.cursors.len(),
            elapsed_ms,
            cancelled: summary.cancelled,
        })
    }
}

/// Write every document until the stream closes
///
/// Takes the receiver by value so that an early return drops it.
async fn drain(
    mut rx: DocumentReceiver,
    writer: &mut dyn RecordWriter,
    tracker: &ProgressTracker,
) -> Result<u64> {
    let mut exported = 0u64;

    while let Some(doc) = rx.recv().await {
        writer.write(&doc).await?;
        exported += 1;
        tracker.update(exported);

        if exported % LOG_EVERY == 0 {
            info!("Progress: {} documents exported", exported);
        }
    }

    debug!("Result stream closed after {} documents", exported);
    Ok(exported)
}
