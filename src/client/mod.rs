//! Search-service client
//!
//! The scroll engine talks to the search service only through the
//! [`SearchClient`] trait: an initial scroll search, scroll continuations,
//! and a release of scroll contexts. [`HttpSearchClient`] implements it
//! against the Elasticsearch 7 REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::export::document::Document;
use crate::query::QueryDocument;

pub mod http;

pub use http::HttpSearchClient;

/// One page of scroll results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    /// Scroll id to continue with (may be empty)
    pub scroll_id: String,
    /// Total matching hits, when the service reports it
    pub total: Option<u64>,
    /// Hit sources, in service order
    pub hits: Vec<Document>,
}

impl SearchPage {
    /// Decode a search or scroll response body
    ///
    /// Hits without a `_source` are skipped. The total is read from
    /// `hits.total.value`, falling back to a numeric `hits.total`.
    pub fn from_body(body: &Value) -> Self {
        let scroll_id = body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let total = body
            .pointer("/hits/total/value")
            .or_else(|| body.pointer("/hits/total"))
            .and_then(Value::as_u64);

        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| hit.get("_source"))
                    .cloned()
                    .map(Document::new)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            scroll_id,
            total,
            hits,
        }
    }
}

/// Search-service capability used by the scroll engine
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run the initial search and open a scroll context
    ///
    /// # Arguments
    /// * `indices` - Index names or patterns (empty searches all)
    /// * `query` - Compiled request body
    /// * `size` - Hits per page
    /// * `keep_alive` - Scroll context keep-alive
    async fn search(
        &self,
        indices: &[String],
        query: &QueryDocument,
        size: usize,
        keep_alive: Duration,
    ) -> Result<SearchPage>;

    /// Fetch the next page of an open scroll context
    async fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage>;

    /// Release scroll contexts
    async fn clear_scroll(&self, scroll_ids: &[String]) -> Result<()>;
}
