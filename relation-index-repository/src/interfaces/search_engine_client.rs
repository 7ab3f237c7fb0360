//! Search engine client trait definition.
//!
//! This module defines the abstract interface for search engine operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch,
//! in-memory doubles for tests).

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::{BulkSummary, ClusterNodes, IndexOperation, SearchPage, SearchRequest};

/// Abstract interface for search engine operations.
///
/// Every call is an independent round trip, so one client can be shared by
/// concurrent lookups.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, SearchError>`. Transport failures and
/// non-success statuses are errors; an empty result set is not.
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Report the cluster name and the nodes currently reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(ClusterNodes)` - Possibly with an empty node list
    /// * `Err(SearchError::ConnectionError)` - If the cluster cannot be asked
    async fn cluster_nodes(&self) -> Result<ClusterNodes, SearchError>;

    /// Execute a search and return one page of results.
    ///
    /// # Arguments
    ///
    /// * `request` - Index, query, returned fields and window size
    ///
    /// # Returns
    ///
    /// * `Ok(SearchPage)` - The hits and the total hit count
    /// * `Err(SearchError::QueryError)` - If the search fails
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError>;

    /// Execute a search that keeps a server-side cursor open.
    ///
    /// The returned page carries the cursor id used by [`scroll`](Self::scroll).
    ///
    /// # Arguments
    ///
    /// * `request` - Index, query, returned fields and page size
    /// * `keep_alive` - How long the engine keeps the cursor between calls
    async fn open_scroll(
        &self,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<SearchPage, SearchError>;

    /// Fetch the next page of an open cursor, refreshing its keep-alive.
    async fn scroll(&self, scroll_id: &str, keep_alive: Duration)
        -> Result<SearchPage, SearchError>;

    /// Release a cursor before its keep-alive expires.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError>;

    /// Send index operations as one bulk request.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - The request reached the engine; individual items
    ///   may still have failed
    /// * `Err(SearchError::BulkIndexError)` - The request as a whole failed
    async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError>;
}
