//! HTTP client for the Elasticsearch scroll API.
//!
//! Handles the initial scroll search, continuations and context release.
//! Requests go to the configured servers in order; a server that cannot be
//! reached, or whose gateway reports it unavailable, is skipped in favour
//! of the next one. No whole-request timeout applies unless one is
//! configured.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{SearchClient, SearchPage};
use crate::config::ConnectionConfig;
use crate::error::{EsdumpError, ErrorInfo, Result, ServiceError, TransportError};
use crate::query::QueryDocument;
use crate::utils::string::truncate;
use crate::utils::time::keep_alive_param;

const SCROLL_PATH: &str = "_search/scroll";

/// Search client speaking the Elasticsearch 7 REST API
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    servers: Vec<String>,
    auth: Option<(String, String)>,
}

impl HttpSearchClient {
    /// Create a new client from connection settings
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(TransportError::NoServers.into());
        }

        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            servers: config
                .servers
                .iter()
                .map(|s| s.trim_end_matches('/').to_string())
                .collect(),
            auth: config.auth.as_deref().and_then(parse_auth),
        })
    }

    /// Send a JSON request, trying each server in turn
    ///
    /// Moves on to the next server on transport failure or a gateway
    /// status (502, 503, 504). Any other non-success status is returned
    /// as [`ServiceError::Rejected`].
    async fn execute(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: String,
    ) -> Result<Value> {
        let mut last_error = None;

        for server in &self.servers {
            let url = format!("{server}/{path}");
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(CONTENT_TYPE, "application/json")
                .query(params)
                .body(body.clone());
            if let Some((username, password)) = &self.auth {
                request = request.basic_auth(username, Some(password));
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, "Request failed, trying next server");
                    last_error = Some(EsdumpError::from(e));
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await?;
            debug!(url = %url, status = status.as_u16(), body = %truncate(&text, 512), "Response");

            if !status.is_success() {
                let err = rejected(status, &text);
                if is_gateway_error(status) {
                    warn!(url = %url, status = status.as_u16(), "Server unavailable, trying next server");
                    last_error = Some(err);
                    continue;
                }
                return Err(err);
            }

            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                TransportError::InvalidResponse(format!("{e}: {}", truncate(&text, 200))).into()
            });
        }

        Err(last_error.unwrap_or(EsdumpError::Transport(TransportError::NoServers)))
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        indices: &[String],
        query: &QueryDocument,
        size: usize,
        keep_alive: Duration,
    ) -> Result<SearchPage> {
        let path = search_path(indices);
        let params = [
            ("scroll", keep_alive_param(keep_alive)),
            ("size", size.to_string()),
        ];

        let body = self.execute(Method::POST, &path, &params, query.to_body()).await?;
        let page = SearchPage::from_body(&body);
        if page.scroll_id.is_empty() {
            debug!(hits = page.hits.len(), "Search response carries no scroll id");
        }
        Ok(page)
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage> {
        let body = json!({
            "scroll": keep_alive_param(keep_alive),
            "scroll_id": scroll_id,
        });
        let value = self
            .execute(Method::POST, SCROLL_PATH, &[], body.to_string())
            .await?;
        Ok(SearchPage::from_body(&value))
    }

    async fn clear_scroll(&self, scroll_ids: &[String]) -> Result<()> {
        let body = json!({ "scroll_id": scroll_ids });
        match self
            .execute(Method::DELETE, SCROLL_PATH, &[], body.to_string())
            .await
        {
            Ok(value) => {
                debug!(num_freed = ?value.get("num_freed"), "Cleared scroll contexts");
                Ok(())
            }
            // Contexts that already expired are reported as not found.
            Err(EsdumpError::Service(ServiceError::Rejected { status: 404, .. })) => {
                debug!("Scroll contexts already released");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Build a rejection from a non-success response, parsing the body if it
/// is JSON
fn rejected(status: StatusCode, text: &str) -> EsdumpError {
    let (info, scroll_id) = match serde_json::from_str::<Value>(text) {
        Ok(body) => (
            ErrorInfo::from_body(&body),
            body.get("_scroll_id")
                .and_then(Value::as_str)
                .map(str::to_owned),
        ),
        Err(_) => (ErrorInfo::from_text(&truncate(text, 200)), None),
    };

    ServiceError::Rejected {
        status: status.as_u16(),
        info,
        scroll_id,
    }
    .into()
}

fn is_gateway_error(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Build the `_search` path for a set of indices
fn search_path(indices: &[String]) -> String {
    let indices: Vec<&str> = indices
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if indices.is_empty() {
        "_search".to_string()
    } else {
        format!("{}/_search", indices.join(","))
    }
}

/// Split `username:password`; anything else disables authentication
fn parse_auth(auth: &str) -> Option<(String, String)> {
    let mut parts = auth.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(pass), None) => Some((user.to_string(), pass.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// One request as seen by the stub server
    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    impl Recorded {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    type Log = Arc<Mutex<Vec<Recorded>>>;

    /// Serve one canned response per connection, in order
    async fn stub(responses: Vec<(u16, &'static str)>) -> (String, Log) {
        stub_with_delay(responses, Duration::ZERO).await
    }

    async fn stub_with_delay(responses: Vec<(u16, &'static str)>, delay: Duration) -> (String, Log) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log: Log = Arc::default();
        let seen = log.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);
                tokio::time::sleep(delay).await;

                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), log)
    }

    async fn read_request(socket: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break buf.len();
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();

        let mut content_length = 0;
        let mut authorization = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    "authorization" => authorization = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }

        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Recorded {
            method,
            target,
            authorization,
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        }
    }

    fn client_for(servers: Vec<String>) -> HttpSearchClient {
        let config = ConnectionConfig {
            servers,
            ..ConnectionConfig::default()
        };
        HttpSearchClient::new(&config).unwrap()
    }

    const SEARCH_BODY: &str = r#"{"_scroll_id":"c1","hits":{"total":{"value":2,"relation":"eq"},"hits":[{"_source":{"id":1}},{"_source":{"id":2}}]}}"#;

    #[test]
    fn test_search_path() {
        assert_eq!(search_path(&[]), "_search");
        assert_eq!(search_path(&["log-*".to_string()]), "log-*/_search");
        assert_eq!(
            search_path(&["a".to_string(), " ".to_string(), "b".to_string()]),
            "a,b/_search"
        );
    }

    #[test]
    fn test_parse_auth() {
        assert_eq!(
            parse_auth("elastic:changeme"),
            Some(("elastic".to_string(), "changeme".to_string()))
        );
        assert_eq!(parse_auth("elastic"), None);
        assert_eq!(parse_auth("a:b:c"), None);
    }

    #[test]
    fn test_new_requires_servers() {
        let config = ConnectionConfig {
            servers: Vec::new(),
            ..ConnectionConfig::default()
        };
        assert!(matches!(
            HttpSearchClient::new(&config),
            Err(EsdumpError::Transport(TransportError::NoServers))
        ));
    }

    #[test]
    fn test_new_normalizes_servers() {
        let config = ConnectionConfig {
            servers: vec!["http://es:9200/".to_string()],
            auth: Some("u:p".to_string()),
            ..ConnectionConfig::default()
        };
        let client = HttpSearchClient::new(&config).unwrap();
        assert_eq!(client.servers, vec!["http://es:9200"]);
        assert_eq!(client.auth, Some(("u".to_string(), "p".to_string())));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = client_for(vec!["http://127.0.0.1:1".to_string()]);
        let err = client
            .scroll("abc", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, EsdumpError::Transport(_)));
    }

    #[tokio::test]
    async fn test_search_request() {
        let (url, log) = stub(vec![(200, SEARCH_BODY)]).await;
        let config = ConnectionConfig {
            servers: vec![url],
            auth: Some("u:p".to_string()),
            ..ConnectionConfig::default()
        };
        let client = HttpSearchClient::new(&config).unwrap();
        let query = QueryDocument::Structured(json!({ "query": { "match_all": {} } }));

        let page = client
            .search(
                &["a".to_string(), "b".to_string()],
                &query,
                10,
                Duration::from_secs(300),
            )
            .await
            .unwrap();

        assert_eq!(page.scroll_id, "c1");
        assert_eq!(page.total, Some(2));
        assert_eq!(page.hits.len(), 2);

        let requests = log.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/a,b/_search?scroll=300000ms&size=10");
        assert_eq!(requests[0].json(), json!({ "query": { "match_all": {} } }));
        assert_eq!(requests[0].authorization.as_deref(), Some("Basic dTpw"));
    }

    #[tokio::test]
    async fn test_search_without_scroll_id_keeps_hits() {
        let (url, _log) = stub(vec![(200, r#"{"hits":{"hits":[{"_source":{"id":1}}]}}"#)]).await;
        let client = client_for(vec![url]);

        let page = client
            .search(&[], &QueryDocument::Raw("{}".to_string()), 10, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(page.scroll_id.is_empty());
        assert_eq!(page.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_request() {
        let (url, log) = stub(vec![(200, r#"{"_scroll_id":"c2","hits":{"hits":[]}}"#)]).await;
        let client = client_for(vec![url]);

        let page = client.scroll("c1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(page.scroll_id, "c2");
        assert!(page.hits.is_empty());

        let requests = log.lock().unwrap().clone();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/_search/scroll");
        assert_eq!(
            requests[0].json(),
            json!({ "scroll": "60000ms", "scroll_id": "c1" })
        );
        assert_eq!(requests[0].authorization, None);
    }

    #[tokio::test]
    async fn test_clear_scroll_request_and_not_found() {
        let (url, log) = stub(vec![
            (200, r#"{"succeeded":true,"num_freed":2}"#),
            (404, r#"{"succeeded":true,"num_freed":0}"#),
        ])
        .await;
        let client = client_for(vec![url]);
        let ids = vec!["a".to_string(), "b".to_string()];

        client.clear_scroll(&ids).await.unwrap();
        client.clear_scroll(&ids).await.unwrap();

        let requests = log.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "DELETE");
        assert_eq!(requests[0].target, "/_search/scroll");
        assert_eq!(requests[0].json(), json!({ "scroll_id": ["a", "b"] }));
    }

    #[tokio::test]
    async fn test_rejected_response_carries_scroll_id() {
        let (url, _log) = stub(vec![(
            500,
            r#"{"error":{"type":"search_phase_execution_exception","reason":"all shards failed"},"status":500,"_scroll_id":"c3"}"#,
        )])
        .await;
        let client = client_for(vec![url]);

        let err = client.scroll("c2", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.scroll_id(), Some("c3"));
        match err {
            EsdumpError::Service(ServiceError::Rejected { status, info, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(info.error_type(), Some("search_phase_execution_exception"));
                assert_eq!(info.reason(), Some("all shards failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_keeps_status() {
        let (url, _log) = stub(vec![(400, "<html>Bad Request</html>")]).await;
        let client = client_for(vec![url]);

        let err = client.scroll("c1", Duration::from_secs(60)).await.unwrap_err();
        match err {
            EsdumpError::Service(ServiceError::Rejected { status, info, scroll_id }) => {
                assert_eq!(status, 400);
                assert_eq!(info.reason(), Some("<html>Bad Request</html>"));
                assert_eq!(scroll_id, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failover_after_unreachable_server() {
        let (url, log) = stub(vec![(200, SEARCH_BODY)]).await;
        let client = client_for(vec!["http://127.0.0.1:1".to_string(), url]);

        let page = client.scroll("c0", Duration::from_secs(60)).await.unwrap();
        assert_eq!(page.scroll_id, "c1");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failover_after_gateway_error() {
        let (first, first_log) = stub(vec![(502, "<html>Bad Gateway</html>")]).await;
        let (second, second_log) = stub(vec![(200, SEARCH_BODY)]).await;
        let client = client_for(vec![first, second]);

        let page = client.scroll("c0", Duration::from_secs(60)).await.unwrap();
        assert_eq!(page.hits.len(), 2);
        assert_eq!(first_log.lock().unwrap().len(), 1);
        assert_eq!(second_log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_error_on_last_server_is_returned() {
        let (url, _log) = stub(vec![(503, "<html>Service Unavailable</html>")]).await;
        let client = client_for(vec![url]);

        let err = client.scroll("c0", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(
            err,
            EsdumpError::Service(ServiceError::Rejected { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_response_is_not_cut_off() {
        let (url, _log) = stub_with_delay(vec![(200, SEARCH_BODY)], Duration::from_millis(1500)).await;
        let client = client_for(vec![url]);

        let page = client
            .search(&[], &QueryDocument::Raw("{}".to_string()), 10, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(page.scroll_id, "c1");
    }

    #[tokio::test]
    async fn test_configured_request_timeout_applies() {
        let (url, _log) = stub_with_delay(vec![(200, SEARCH_BODY)], Duration::from_secs(3)).await;
        let config = ConnectionConfig {
            servers: vec![url],
            request_timeout: Some(1),
            ..ConnectionConfig::default()
        };
        let client = HttpSearchClient::new(&config).unwrap();

        let err = client
            .search(&[], &QueryDocument::Raw("{}".to_string()), 10, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert!(matches!(err, EsdumpError::Transport(_)));
    }
}
