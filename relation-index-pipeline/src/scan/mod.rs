//! Scan module for the relation index pipeline.
//!
//! Walks an entire result set through a server-side scroll cursor, one page
//! per round trip, until the engine returns an empty page.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use tracing::{debug, error, info, warn};

use relation_index_repository::{SearchEngineClient, SearchError, SearchHit, SearchRequest};

/// Configuration for scroll scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollConfig {
    /// How long the engine keeps the cursor alive between two pages.
    pub keep_alive: Duration,
    /// Number of hits requested per page.
    pub page_size: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            page_size: 10_000,
        }
    }
}

impl ScrollConfig {
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Cursor bookkeeping. Only the owning [`ScrollCursor`] touches it.
#[derive(Debug, Default)]
struct ScrollState {
    cursor_id: Option<String>,
    exhausted: bool,
}

/// A single-pass, pull-based cursor over every document matching a request.
///
/// The first call to [`next_page`](Self::next_page) opens the cursor, later
/// calls advance it with the id returned by the previous page. Advancing
/// takes `&mut self`, so one cursor is never advanced concurrently.
pub struct ScrollCursor {
    client: Arc<dyn SearchEngineClient>,
    request: SearchRequest,
    keep_alive: Duration,
    state: ScrollState,
    pages: usize,
}

impl ScrollCursor {
    /// Create a cursor. Nothing is sent until the first page is requested.
    pub fn new(
        client: Arc<dyn SearchEngineClient>,
        request: SearchRequest,
        keep_alive: Duration,
    ) -> Self {
        Self {
            client,
            request,
            keep_alive,
            state: ScrollState::default(),
            pages: 0,
        }
    }

    /// Whether another call to `next_page` may still yield hits.
    pub fn has_more(&self) -> bool {
        !self.state.exhausted
    }

    /// Number of non-empty pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Fetch the next page of hits.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(hits))` - A non-empty page
    /// * `Ok(None)` - The cursor is exhausted and has been released
    /// * `Err(SearchError)` - The round trip failed; the cursor is released
    ///   and yields nothing more
    pub async fn next_page(&mut self) -> Result<Option<Vec<SearchHit>>, SearchError> {
        if self.state.exhausted {
            return Ok(None);
        }

        let result = match &self.state.cursor_id {
            None => {
                self.client
                    .open_scroll(&self.request, self.keep_alive)
                    .await
            }
            Some(cursor_id) => self.client.scroll(cursor_id, self.keep_alive).await,
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        if let Some(cursor_id) = page.scroll_id {
            self.state.cursor_id = Some(cursor_id);
        }

        if page.hits.is_empty() {
            debug!(pages = self.pages, "Scroll exhausted");
            self.release().await;
            return Ok(None);
        }

        self.pages += 1;
        debug!(page = self.pages, hits = page.hits.len(), "Scroll page fetched");
        Ok(Some(page.hits))
    }

    /// Mark the cursor exhausted and free it on the server.
    async fn release(&mut self) {
        self.state.exhausted = true;
        if let Some(cursor_id) = self.state.cursor_id.take() {
            if let Err(e) = self.client.clear_scroll(&cursor_id).await {
                // The engine drops it anyway once the keep-alive expires.
                warn!(error = %e, "Failed to release scroll cursor");
            }
        }
    }

    /// Turn the cursor into a lazy stream of pages.
    ///
    /// The stream ends after the first empty page, or right after yielding
    /// an error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<SearchHit>, SearchError>> {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next_page().await {
                Ok(Some(hits)) => Some((Ok(hits), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Drain the cursor, collecting the distinct string values of `field`.
    ///
    /// A failure stops the scan; whatever was collected before it is kept
    /// and the failure is reported alongside.
    pub async fn collect_field(mut self, field: &str) -> ScanOutcome {
        let mut values = HashSet::new();

        loop {
            match self.next_page().await {
                Ok(Some(hits)) => {
                    values.extend(hits.iter().filter_map(|hit| hit.field_str(field)));
                    debug!(pages = self.pages, distinct = values.len(), "Page processed");
                }
                Ok(None) => {
                    info!(
                        field,
                        pages = self.pages,
                        distinct = values.len(),
                        "Scan completed"
                    );
                    return ScanOutcome {
                        values,
                        pages: self.pages,
                        failure: None,
                    };
                }
                Err(e) => {
                    error!(
                        field,
                        error = %e,
                        pages = self.pages,
                        distinct = values.len(),
                        "Scan aborted, returning partial results"
                    );
                    return ScanOutcome {
                        values,
                        pages: self.pages,
                        failure: Some(e),
                    };
                }
            }
        }
    }
}

/// Distinct values gathered by a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub values: HashSet<String>,
    /// Number of non-empty pages processed.
    pub pages: usize,
    /// Set when the scan stopped early; `values` is then partial.
    pub failure: Option<SearchError>,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}
