//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust client.

use std::time::Duration;

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    nodes::NodesInfoParts,
    BulkParts, ClearScrollParts, OpenSearch, ScrollParts, SearchParts,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use crate::types::{
    BulkItemFailure, BulkSummary, ClusterNodes, IndexOperation, NodeInfo, SearchHit, SearchPage,
    SearchRequest,
};

/// OpenSearch client implementation.
///
/// Talks to a single node over HTTP. The node is only contacted when a
/// request is sent; connectivity is verified by the caller through
/// [`SearchEngineClient::cluster_nodes`].
///
/// # Example
///
/// ```ignore
/// use relation_index_repository::{ConnectionConfig, OpenSearchClient, SearchEngineClient};
///
/// let client = OpenSearchClient::new(&ConnectionConfig::new("localhost", 9200))?;
/// let nodes = client.cluster_nodes().await?;
/// println!("{} nodes in {}", nodes.nodes.len(), nodes.cluster_name);
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    url: String,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client for the configured node.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If the URL is invalid or the transport cannot be built
    pub fn new(config: &ConnectionConfig) -> Result<Self, SearchError> {
        let url = config.url();
        let parsed_url = Url::parse(&url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, "Created OpenSearch client");

        Ok(Self { client, url })
    }

    /// The node URL this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn search_body(request: &SearchRequest) -> Value {
        let mut body = json!({
            "query": request.query,
            "size": request.size,
        });
        if !request.fields.is_empty() {
            body["_source"] = json!(request.fields);
        }
        body
    }

    /// Read a response body as JSON, turning non-success statuses into
    /// errors built by `make_error`.
    async fn read_json(
        response: Response,
        make_error: fn(String) -> SearchError,
    ) -> Result<Value, SearchError> {
        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Request failed");
            return Err(make_error(format!(
                "Request failed with status {}: {}",
                status, error_body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))
    }

    /// Parse a search or scroll response.
    pub(crate) fn parse_page(body: &Value) -> Result<SearchPage, SearchError> {
        let hits = body
            .get("hits")
            .ok_or_else(|| SearchError::parse("response has no hits section"))?;

        // `hits.total` is an object since 7.x and a bare number before.
        let total_hits = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            None => 0,
        };

        let hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(Self::parse_hit).collect())
            .unwrap_or_default();

        let scroll_id = body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(SearchPage {
            total_hits,
            hits,
            scroll_id,
        })
    }

    /// Parse a single hit, merging `_source` with stored `fields`.
    pub(crate) fn parse_hit(hit: &Value) -> SearchHit {
        let mut fields = Map::new();
        if let Some(Value::Object(source)) = hit.get("_source") {
            fields.extend(source.clone());
        }
        if let Some(Value::Object(stored)) = hit.get("fields") {
            fields.extend(stored.clone());
        }

        SearchHit {
            id: hit.get("_id").and_then(Value::as_str).map(str::to_string),
            fields,
        }
    }

    /// Parse a nodes-info response.
    pub(crate) fn parse_cluster_nodes(body: &Value) -> ClusterNodes {
        let cluster_name = body
            .get("cluster_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let nodes = body
            .get("nodes")
            .and_then(Value::as_object)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|(id, node)| NodeInfo {
                        id: id.clone(),
                        name: node
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or(id)
                            .to_string(),
                        address: node
                            .get("transport_address")
                            .or_else(|| node.get("host"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        ClusterNodes {
            cluster_name,
            nodes,
        }
    }

    /// Parse a bulk response into a summary of per-item failures.
    pub(crate) fn parse_bulk_summary(body: &Value, total: usize) -> BulkSummary {
        let took_ms = body.get("took").and_then(Value::as_u64).unwrap_or(0);

        let has_errors = body.get("errors").and_then(Value::as_bool).unwrap_or(false);
        if !has_errors {
            return BulkSummary {
                took_ms,
                total,
                failures: Vec::new(),
            };
        }

        let failures = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(position, item)| {
                        // Each item is keyed by its action name, e.g. {"index": {...}}.
                        let result = item.as_object()?.values().next()?;
                        let error = result.get("error")?;
                        Some(BulkItemFailure {
                            position,
                            index: result
                                .get("_index")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            id: result.get("_id").and_then(Value::as_str).map(str::to_string),
                            status: result
                                .get("status")
                                .and_then(Value::as_u64)
                                .and_then(|s| u16::try_from(s).ok())
                                .unwrap_or(0),
                            reason: error
                                .get("reason")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| error.to_string()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        BulkSummary {
            took_ms,
            total,
            failures,
        }
    }

    fn keep_alive(duration: Duration) -> String {
        format!("{}ms", duration.as_millis())
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn cluster_nodes(&self) -> Result<ClusterNodes, SearchError> {
        let response = self
            .client
            .nodes()
            .info(NodesInfoParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let body = Self::read_json(response, SearchError::ConnectionError).await?;
        let nodes = Self::parse_cluster_nodes(&body);

        debug!(
            cluster_name = %nodes.cluster_name,
            node_count = nodes.nodes.len(),
            "Fetched cluster nodes"
        );
        Ok(nodes)
    }

    #[instrument(skip(self, request), fields(index = %request.index, doc_type = %request.doc_type, size = request.size))]
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&request.index]))
            .body(Self::search_body(request))
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let body = Self::read_json(response, SearchError::QueryError).await?;
        let page = Self::parse_page(&body)?;

        debug!(total_hits = page.total_hits, returned = page.hits.len(), "Search completed");
        Ok(page)
    }

    #[instrument(skip(self, request), fields(index = %request.index, doc_type = %request.doc_type, size = request.size))]
    async fn open_scroll(
        &self,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<SearchPage, SearchError> {
        let keep_alive = Self::keep_alive(keep_alive);
        let response = self
            .client
            .search(SearchParts::Index(&[&request.index]))
            .scroll(&keep_alive)
            .body(Self::search_body(request))
            .send()
            .await
            .map_err(|e| SearchError::scroll(e.to_string()))?;

        let body = Self::read_json(response, SearchError::ScrollError).await?;
        let page = Self::parse_page(&body)?;

        if page.scroll_id.is_none() {
            return Err(SearchError::scroll("response carries no scroll id"));
        }

        debug!(total_hits = page.total_hits, returned = page.hits.len(), "Scroll opened");
        Ok(page)
    }

    #[instrument(skip(self, scroll_id))]
    async fn scroll(
        &self,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<SearchPage, SearchError> {
        let response = self
            .client
            .scroll(ScrollParts::None)
            .body(json!({
                "scroll": Self::keep_alive(keep_alive),
                "scroll_id": scroll_id
            }))
            .send()
            .await
            .map_err(|e| SearchError::scroll(e.to_string()))?;

        let body = Self::read_json(response, SearchError::ScrollError).await?;
        Self::parse_page(&body)
    }

    #[instrument(skip(self, scroll_id))]
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await
            .map_err(|e| SearchError::scroll(e.to_string()))?;

        let status = response.status_code();
        // 404: the cursor already expired on the server.
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::scroll(format!(
                "Clear scroll failed with status {}: {}",
                status, error_body
            )));
        }

        debug!("Scroll cleared");
        Ok(())
    }

    #[instrument(skip(self, operations), fields(count = operations.len()))]
    async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(operations.len() * 2);
        for operation in operations {
            body.push(json!({ "index": { "_index": operation.index } }).into());
            body.push(operation.source.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let body = Self::read_json(response, SearchError::BulkIndexError).await?;
        let summary = Self::parse_bulk_summary(&body, operations.len());

        debug!(
            took_ms = summary.took_ms,
            failed = summary.failures.len(),
            "Bulk request completed"
        );
        Ok(summary)
    }
}
