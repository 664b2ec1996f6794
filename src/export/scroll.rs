//! Scroll engine
//!
//! Drives one export session against the search service:
//!
//! ```text
//! INIT -> SEARCHING -> STREAMING(cursor) -> STREAMING(cursor') -> ... -> EMPTY -> CLOSE
//! ```
//!
//! The initial search opens a scroll context; continuation requests follow
//! until a page comes back without hits or without a cursor. Every hit is
//! forwarded, in service order, to the result stream. Every cursor seen is
//! recorded in the session's [`CursorChain`] and released in one request
//! when the session ends, whatever the outcome. Release failures are only
//! logged.
//!
//! Failure handling:
//! - initial search failures always end the session with an error
//! - continuation failures end it unless `ignore_errors` is set, in which
//!   case the loop goes on with the cursor the failed response carried (a
//!   failure without a cursor ends the loop), for at most
//!   `max_scroll_errors` consecutive failures
//! - cancellation is checked before each request and raced against the
//!   request in flight; the session then goes straight to release

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::client::SearchClient;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::query::{QueryDocument, build_query};

use super::document::Document;
use super::stream::DocumentSender;

/// Ordered set of every cursor id seen in one session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CursorChain {
    ids: Vec<String>,
}

impl CursorChain {
    /// Record a cursor id. Empty and already recorded ids are ignored.
    ///
    /// # Returns
    /// * `bool` - True if the id was added
    pub fn push(&mut self, id: &str) -> bool {
        if id.is_empty() || self.ids.iter().any(|known| known == id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// Recorded ids, in the order first seen
    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Number of recorded ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no cursor has been recorded
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpSummary {
    /// Total hits reported by the initial search
    pub total: Option<u64>,
    /// Documents forwarded to the stream
    pub forwarded: u64,
    /// Continuation requests that returned a page
    pub scroll_pages: u64,
    /// Continuation failures that were tolerated
    pub tolerated_errors: u64,
    /// Every cursor seen, in order
    pub cursors: Vec<String>,
    /// Whether the release request succeeded
    pub released: bool,
    /// Whether the session stopped on cancellation
    pub cancelled: bool,
}

/// Producer side of an export session
pub struct ScrollEngine {
    client: Arc<dyn SearchClient>,
    query: QueryDocument,
    config: ExportConfig,
    span: Span,
}

impl ScrollEngine {
    /// Create an engine for an already compiled query
    pub fn new(client: Arc<dyn SearchClient>, query: QueryDocument, config: ExportConfig) -> Self {
        let span = info_span!("dump", indices = ?config.indices);
        Self {
            client,
            query,
            config,
            span,
        }
    }

    /// Compile the query from `config` and create an engine for it
    ///
    /// # Returns
    /// * `Result<Self>` - Engine, or a config error from query compilation
    pub fn from_config(client: Arc<dyn SearchClient>, config: ExportConfig) -> Result<Self> {
        let query = build_query(&config)?;
        Ok(Self::new(client, query, config))
    }

    /// Emit this session's log events inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run the session, streaming documents into `sender`
    ///
    /// The sender is closed when this returns, on every path. The cursor
    /// chain is released before that, also on every path.
    ///
    /// # Arguments
    /// * `cancel` - Cancellation signal, checked at request boundaries
    /// * `sender` - Producer half of the result stream
    ///
    /// # Returns
    /// * `Result<DumpSummary>` - Session summary, or the first fatal error
    pub async fn dump(self, cancel: CancellationToken, sender: DocumentSender) -> Result<DumpSummary> {
        let span = self.span.clone();
        self.run(cancel, sender).instrument(span).await
    }

    async fn run(self, cancel: CancellationToken, sender: DocumentSender) -> Result<DumpSummary> {
        let mut chain = CursorChain::default();
        let mut summary = DumpSummary::default();

        let outcome = self.stream(&cancel, &sender, &mut chain, &mut summary).await;

        summary.released = self.release(&chain).await;
        summary.cursors = chain.into_vec();
        sender.close();

        match outcome {
            Ok(()) => {
                info!(
                    forwarded = summary.forwarded,
                    cursors = summary.cursors.len(),
                    cancelled = summary.cancelled,
                    "Scroll session finished"
                );
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }

    /// SEARCHING and STREAMING states
    async fn stream(
        &self,
        cancel: &CancellationToken,
        sender: &DocumentSender,
        chain: &mut CursorChain,
        summary: &mut DumpSummary,
    ) -> Result<()> {
        let keep_alive = self.config.scroll;

        if self.config.debug {
            info!(query = %self.query.to_body(), "Search request body");
        }

        let search = self.client.search(
            &self.config.indices,
            &self.query,
            self.config.page_size,
            keep_alive,
        );
        let page = match guarded(cancel, search).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                info!("Cancelled before the initial search");
                summary.cancelled = true;
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Initial search failed");
                return Err(e);
            }
        };

        debug!(scroll_id = %page.scroll_id, total = ?page.total, "Initial search");
        summary.total = page.total;
        chain.push(&page.scroll_id);
        let mut scroll_id = page.scroll_id;

        if !forward(sender, page.hits, summary).await {
            return Ok(());
        }

        let mut consecutive_errors = 0u32;

        while !scroll_id.is_empty() {
            let result = guarded(cancel, self.client.scroll(&scroll_id, keep_alive)).await;

            match result {
                Ok(Some(page)) => {
                    consecutive_errors = 0;
                    summary.scroll_pages += 1;
                    chain.push(&page.scroll_id);

                    if page.hits.is_empty() {
                        debug!(scroll_id = %page.scroll_id, "Empty page, scroll exhausted");
                        break;
                    }

                    scroll_id = page.scroll_id;
                    if !forward(sender, page.hits, summary).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!(forwarded = summary.forwarded, "Scroll cancelled");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(scroll_id = %scroll_id, error = %e, "Scroll request failed");
                    if !self.config.ignore_errors {
                        return Err(e);
                    }

                    summary.tolerated_errors += 1;
                    consecutive_errors += 1;
                    if consecutive_errors >= self.config.max_scroll_errors {
                        warn!(
                            consecutive_errors,
                            "Too many consecutive scroll failures, stopping"
                        );
                        break;
                    }

                    scroll_id = e.scroll_id().unwrap_or_default().to_string();
                    chain.push(&scroll_id);
                }
            }
        }

        Ok(())
    }

    /// CLOSE state: release every cursor in one request
    async fn release(&self, chain: &CursorChain) -> bool {
        if chain.is_empty() {
            debug!("No scroll contexts to release");
            return false;
        }

        match self.client.clear_scroll(chain.as_slice()).await {
            Ok(()) => {
                debug!(count = chain.len(), "Released scroll contexts");
                true
            }
            Err(e) => {
                error!(scroll_ids = ?chain.as_slice(), error = %e, "Failed to release scroll contexts");
                false
            }
        }
    }
}

/// Run `request` unless `cancel` fires first
///
/// # Returns
/// * `Ok(None)` if cancelled, before or during the request
async fn guarded<T, F>(cancel: &CancellationToken, request: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Ok(None);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        result = request => result.map(Some),
    }
}

/// Forward one page of hits in order
///
/// # Returns
/// * `bool` - False if the consumer went away
async fn forward(sender: &DocumentSender, hits: Vec<Document>, summary: &mut DumpSummary) -> bool {
    for doc in hits {
        if sender.send(doc).await.is_err() {
            warn!(forwarded = summary.forwarded, "Consumer closed the stream, stopping");
            return false;
        }
        summary.forwarded += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SearchPage;
    use crate::error::{EsdumpError, ErrorInfo, ServiceError, TransportError};
    use crate::export::stream::{self, DocumentReceiver};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    // Mock search client for testing
    #[derive(Default)]
    struct MockClient {
        search_result: Mutex<Option<Result<SearchPage>>>,
        pages: Mutex<VecDeque<Result<SearchPage>>>,
        scroll_calls: Mutex<Vec<String>>,
        released: Mutex<Vec<Vec<String>>>,
        fail_release: bool,
        cancel_on_scroll: Option<CancellationToken>,
    }

    impl MockClient {
        fn new(first: Result<SearchPage>, pages: Vec<Result<SearchPage>>) -> Self {
            Self {
                search_result: Mutex::new(Some(first)),
                pages: Mutex::new(pages.into()),
                ..Self::default()
            }
        }

        fn released(&self) -> Vec<Vec<String>> {
            self.released.lock().unwrap().clone()
        }

        fn scroll_calls(&self) -> Vec<String> {
            self.scroll_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchClient for MockClient {
        async fn search(
            &self,
            _indices: &[String],
            _query: &QueryDocument,
            _size: usize,
            _keep_alive: Duration,
        ) -> Result<SearchPage> {
            self.search_result
                .lock()
                .unwrap()
                .take()
                .expect("search called twice")
        }

        async fn scroll(&self, scroll_id: &str, _keep_alive: Duration) -> Result<SearchPage> {
            self.scroll_calls.lock().unwrap().push(scroll_id.to_string());
            if let Some(token) = &self.cancel_on_scroll {
                token.cancel();
            }
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page("", 0, 0)))
        }

        async fn clear_scroll(&self, scroll_ids: &[String]) -> Result<()> {
            self.released.lock().unwrap().push(scroll_ids.to_vec());
            if self.fail_release {
                return Err(TransportError::RequestFailed {
                    url: "http://es/_search/scroll".to_string(),
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn page(scroll_id: &str, start: u64, count: u64) -> SearchPage {
        SearchPage {
            scroll_id: scroll_id.to_string(),
            total: Some(100),
            hits: (start..start + count)
                .map(|i| Document::new(json!({ "id": i })))
                .collect(),
        }
    }

    fn rejected(scroll_id: Option<&str>) -> EsdumpError {
        ServiceError::Rejected {
            status: 500,
            info: ErrorInfo::default(),
            scroll_id: scroll_id.map(str::to_string),
        }
        .into()
    }

    fn config(ignore_errors: bool) -> ExportConfig {
        ExportConfig {
            fields: vec!["id".to_string()],
            ignore_errors,
            max_scroll_errors: 3,
            ..ExportConfig::default()
        }
    }

    async fn drain(mut rx: DocumentReceiver) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(doc) = rx.recv().await {
            ids.push(doc.get_scalar("id").unwrap_or_default());
        }
        ids
    }

    async fn run_session(
        client: Arc<MockClient>,
        config: ExportConfig,
        cancel: CancellationToken,
    ) -> (Result<DumpSummary>, Vec<String>) {
        let engine = ScrollEngine::from_config(client, config).unwrap();
        let (tx, rx) = stream::channel();
        let producer = tokio::spawn(engine.dump(cancel, tx));
        let ids = drain(rx).await;
        (producer.await.unwrap(), ids)
    }

    fn expected_ids(range: std::ops::Range<u64>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pages_streamed_in_order_and_all_cursors_released() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 2)),
            vec![Ok(page("cursorA", 2, 3)), Ok(page("cursorB", 5, 0))],
        ));

        let (result, ids) = run_session(client.clone(), config(false), CancellationToken::new()).await;
        let summary = result.unwrap();

        assert_eq!(ids, expected_ids(0..5));
        assert_eq!(summary.forwarded, 5);
        assert_eq!(summary.total, Some(100));
        assert_eq!(summary.scroll_pages, 2);
        assert_eq!(client.scroll_calls(), vec!["initial", "cursorA"]);
        assert_eq!(
            client.released(),
            vec![vec!["initial".to_string(), "cursorA".to_string(), "cursorB".to_string()]]
        );
        assert!(summary.released);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_repeated_cursor_recorded_once() {
        let client = Arc::new(MockClient::new(
            Ok(page("same", 0, 1)),
            vec![Ok(page("same", 1, 1)), Ok(page("same", 2, 0))],
        ));

        let (result, ids) = run_session(client.clone(), config(false), CancellationToken::new()).await;
        assert_eq!(ids, expected_ids(0..2));
        assert_eq!(result.unwrap().cursors, vec!["same"]);
        assert_eq!(client.released(), vec![vec!["same".to_string()]]);
    }

    #[tokio::test]
    async fn test_initial_search_failure_is_fatal() {
        let client = Arc::new(MockClient::new(
            Err(TransportError::NoServers.into()),
            vec![],
        ));

        let (result, ids) = run_session(client.clone(), config(true), CancellationToken::new()).await;
        assert!(matches!(result, Err(EsdumpError::Transport(_))));
        assert!(ids.is_empty());
        assert!(client.scroll_calls().is_empty());
        // Nothing to release when no cursor was ever returned.
        assert!(client.released().is_empty());
    }

    #[tokio::test]
    async fn test_scroll_failure_without_tolerance_propagates() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 2)),
            vec![Err(rejected(Some("cursorA"))), Ok(page("cursorB", 2, 2))],
        ));

        let (result, ids) = run_session(client.clone(), config(false), CancellationToken::new()).await;
        assert!(matches!(result, Err(EsdumpError::Service(_))));
        assert_eq!(ids, expected_ids(0..2));
        assert_eq!(client.released(), vec![vec!["initial".to_string()]]);
    }

    #[tokio::test]
    async fn test_tolerated_failure_continues_with_returned_cursor() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 1)),
            vec![
                Err(rejected(Some("cursorA"))),
                Ok(page("cursorB", 1, 2)),
                Ok(page("cursorC", 3, 0)),
            ],
        ));

        let (result, ids) = run_session(client.clone(), config(true), CancellationToken::new()).await;
        let summary = result.unwrap();
        assert_eq!(ids, expected_ids(0..3));
        assert_eq!(summary.tolerated_errors, 1);
        assert_eq!(client.scroll_calls(), vec!["initial", "cursorA", "cursorB"]);
        assert_eq!(summary.cursors, vec!["initial", "cursorA", "cursorB", "cursorC"]);
    }

    #[tokio::test]
    async fn test_tolerated_failure_without_cursor_ends_scroll() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 1)),
            vec![
                Err(EsdumpError::Io(io::Error::other("reset"))),
                Ok(page("never", 1, 5)),
            ],
        ));

        let (result, ids) = run_session(client.clone(), config(true), CancellationToken::new()).await;
        let summary = result.unwrap();
        assert_eq!(ids, expected_ids(0..1));
        assert_eq!(summary.tolerated_errors, 1);
        assert_eq!(client.scroll_calls(), vec!["initial"]);
        assert_eq!(client.released(), vec![vec!["initial".to_string()]]);
    }

    #[tokio::test]
    async fn test_consecutive_failures_are_bounded() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 1)),
            vec![
                Err(rejected(Some("initial"))),
                Err(rejected(Some("initial"))),
                Err(rejected(Some("initial"))),
                Ok(page("never", 1, 5)),
            ],
        ));

        let (result, ids) = run_session(client.clone(), config(true), CancellationToken::new()).await;
        let summary = result.unwrap();
        assert_eq!(ids, expected_ids(0..1));
        assert_eq!(summary.tolerated_errors, 3);
        assert_eq!(client.scroll_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_first_page_without_cursor_is_forwarded() {
        let client = Arc::new(MockClient::new(Ok(page("", 0, 3)), vec![]));

        let (result, ids) = run_session(client.clone(), config(false), CancellationToken::new()).await;
        let summary = result.unwrap();

        assert_eq!(ids, expected_ids(0..3));
        assert_eq!(summary.forwarded, 3);
        assert!(summary.cursors.is_empty());
        assert!(client.scroll_calls().is_empty());
        assert!(client.released().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(MockClient::new(Ok(page("initial", 0, 2)), vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (result, ids) = run_session(client.clone(), config(false), cancel).await;
        let summary = result.unwrap();
        assert!(summary.cancelled);
        assert!(ids.is_empty());
        assert!(client.released().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_pages() {
        let cancel = CancellationToken::new();
        let client = Arc::new(MockClient {
            cancel_on_scroll: Some(cancel.clone()),
            ..MockClient::new(
                Ok(page("initial", 0, 2)),
                vec![Ok(page("cursorA", 2, 2)), Ok(page("cursorB", 4, 2))],
            )
        });

        let (result, ids) = run_session(client.clone(), config(false), cancel).await;
        let summary = result.unwrap();

        // The page in flight when cancellation fired is still delivered.
        assert_eq!(ids, expected_ids(0..4));
        assert!(summary.cancelled);
        assert_eq!(client.scroll_calls(), vec!["initial"]);
        assert_eq!(
            client.released(),
            vec![vec!["initial".to_string(), "cursorA".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_consumer_gone_stops_engine() {
        let client = Arc::new(MockClient::new(
            Ok(page("initial", 0, 3)),
            vec![Ok(page("cursorA", 3, 3))],
        ));
        let engine = ScrollEngine::from_config(client.clone(), config(false)).unwrap();
        let (tx, rx) = stream::channel();
        drop(rx);

        let summary = engine.dump(CancellationToken::new(), tx).await.unwrap();
        assert_eq!(summary.forwarded, 0);
        assert!(client.scroll_calls().is_empty());
        assert_eq!(client.released(), vec![vec!["initial".to_string()]]);
    }

    #[tokio::test]
    async fn test_release_failure_is_logged_not_fatal() {
        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = Arc::new(MockClient {
            fail_release: true,
            ..MockClient::new(Ok(page("initial", 0, 1)), vec![Ok(page("cursorA", 1, 0))])
        });
        let engine = ScrollEngine::from_config(client.clone(), config(false))
            .unwrap()
            .with_span(info_span!("session", id = 7));
        let (tx, rx) = stream::channel();

        // Run inline so the thread-local subscriber sees every event.
        let (result, ids) = tokio::join!(engine.dump(CancellationToken::new(), tx), drain(rx));
        let summary = result.unwrap();

        assert_eq!(ids, expected_ids(0..1));
        assert!(!summary.released);
        assert_eq!(client.released().len(), 1);

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Failed to release scroll contexts"));
        assert!(logs.contains("session"));
    }

    #[test]
    fn test_cursor_chain() {
        let mut chain = CursorChain::default();
        assert!(chain.push("a"));
        assert!(!chain.push(""));
        assert!(chain.push("b"));
        assert!(!chain.push("a"));
        assert_eq!(chain.as_slice(), &["a".to_string(), "b".to_string()]);
        assert_eq!(chain.len(), 2);
    }
}
