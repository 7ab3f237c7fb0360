//! In-memory search engine used by the pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use relation_index_repository::{
    BulkSummary, ClusterNodes, IndexOperation, NodeInfo, SearchEngineClient, SearchError,
    SearchHit, SearchPage, SearchRequest,
};

/// Mock search client backed by a list of documents.
///
/// Searches evaluate `bool.must` term clauses against the documents in
/// insertion order. Successful bulk requests append their documents.
pub(crate) struct MockSearchClient {
    nodes: ClusterNodes,
    documents: Mutex<Vec<Value>>,
    search_errors: Mutex<VecDeque<SearchError>>,
    bulk_results: Mutex<VecDeque<Result<BulkSummary, SearchError>>>,
    bulk_calls: Mutex<Vec<Vec<IndexOperation>>>,
    cursors: Mutex<HashMap<String, VecDeque<Vec<SearchHit>>>>,
    scroll_failure_after: Mutex<Option<usize>>,
    bulk_delay: Mutex<Option<Duration>>,
    bulk_in_flight: AtomicUsize,
    peak_bulk_in_flight: AtomicUsize,
    keep_alives: Mutex<Vec<Duration>>,
    pub cluster_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub scroll_calls: AtomicUsize,
    pub cleared: Mutex<Vec<String>>,
    next_cursor: AtomicUsize,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self {
            nodes: ClusterNodes {
                cluster_name: "test-cluster".to_string(),
                nodes: vec![NodeInfo {
                    id: "n1".to_string(),
                    name: "node-1".to_string(),
                    address: Some("127.0.0.1:9300".to_string()),
                }],
            },
            documents: Mutex::new(Vec::new()),
            search_errors: Mutex::new(VecDeque::new()),
            bulk_results: Mutex::new(VecDeque::new()),
            bulk_calls: Mutex::new(Vec::new()),
            cursors: Mutex::new(HashMap::new()),
            scroll_failure_after: Mutex::new(None),
            bulk_delay: Mutex::new(None),
            bulk_in_flight: AtomicUsize::new(0),
            peak_bulk_in_flight: AtomicUsize::new(0),
            keep_alives: Mutex::new(Vec::new()),
            cluster_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            scroll_calls: AtomicUsize::new(0),
            cleared: Mutex::new(Vec::new()),
            next_cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_nodes(mut self, nodes: ClusterNodes) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_documents(self, documents: Vec<Value>) -> Self {
        *self.documents.lock().unwrap() = documents;
        self
    }

    /// Fail the next search or scroll open with `error`.
    pub fn fail_next_search(&self, error: SearchError) {
        self.search_errors.lock().unwrap().push_back(error);
    }

    /// Answer the next bulk request with `result` instead of success.
    pub fn push_bulk_result(&self, result: Result<BulkSummary, SearchError>) {
        self.bulk_results.lock().unwrap().push_back(result);
    }

    /// Let `successful` scroll advances through, then fail every advance.
    pub fn fail_scroll_after(&self, successful: usize) {
        *self.scroll_failure_after.lock().unwrap() = Some(successful);
    }

    /// Hold every bulk request for `delay` before answering.
    pub fn set_bulk_delay(&self, delay: Duration) {
        *self.bulk_delay.lock().unwrap() = Some(delay);
    }

    pub fn bulk_in_flight(&self) -> usize {
        self.bulk_in_flight.load(Ordering::SeqCst)
    }

    /// Most bulk requests ever answered at the same time.
    pub fn peak_bulk_in_flight(&self) -> usize {
        self.peak_bulk_in_flight.load(Ordering::SeqCst)
    }

    /// Keep-alive passed to every scroll open and advance, in call order.
    pub fn keep_alives(&self) -> Vec<Duration> {
        self.keep_alives.lock().unwrap().clone()
    }

    pub fn bulk_calls(&self) -> Vec<Vec<IndexOperation>> {
        self.bulk_calls.lock().unwrap().clone()
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.lock().unwrap().len()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }

    fn matches(document: &Value, query: &Value) -> bool {
        let clauses = query
            .pointer("/bool/must")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        clauses.iter().all(|clause| {
            clause
                .get("term")
                .and_then(Value::as_object)
                .map(|term| {
                    term.iter()
                        .all(|(field, expected)| document.get(field) == Some(expected))
                })
                .unwrap_or(false)
        })
    }

    fn select(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        if let Some(error) = self.search_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .filter(|document| Self::matches(document, &request.query))
            .map(|document| {
                let mut hit = SearchHit::from_source(document.clone());
                if !request.fields.is_empty() {
                    hit.fields.retain(|name, _| request.fields.contains(name));
                }
                hit
            })
            .collect())
    }
}

#[async_trait]
impl SearchEngineClient for MockSearchClient {
    async fn cluster_nodes(&self) -> Result<ClusterNodes, SearchError> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nodes.clone())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let hits = self.select(request)?;
        let total = hits.len() as u64;
        Ok(SearchPage::new(
            total,
            hits.into_iter().take(request.size).collect(),
        ))
    }

    async fn open_scroll(
        &self,
        request: &SearchRequest,
        keep_alive: Duration,
    ) -> Result<SearchPage, SearchError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.keep_alives.lock().unwrap().push(keep_alive);
        let hits = self.select(request)?;
        let total = hits.len() as u64;

        let mut pages: VecDeque<Vec<SearchHit>> = hits
            .chunks(request.size.max(1))
            .map(<[SearchHit]>::to_vec)
            .collect();
        let first = pages.pop_front().unwrap_or_default();

        let cursor_id = format!("cursor-{}", self.next_cursor.fetch_add(1, Ordering::SeqCst));
        self.cursors.lock().unwrap().insert(cursor_id.clone(), pages);

        Ok(SearchPage::new(total, first).with_scroll_id(cursor_id))
    }

    async fn scroll(
        &self,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<SearchPage, SearchError> {
        self.keep_alives.lock().unwrap().push(keep_alive);
        let advanced = self.scroll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.scroll_failure_after.lock().unwrap() {
            if advanced >= limit {
                return Err(SearchError::scroll("node left the cluster"));
            }
        }

        let mut cursors = self.cursors.lock().unwrap();
        let pages = cursors
            .get_mut(scroll_id)
            .ok_or_else(|| SearchError::scroll(format!("unknown cursor {}", scroll_id)))?;
        let page = pages.pop_front().unwrap_or_default();

        Ok(SearchPage::new(page.len() as u64, page).with_scroll_id(scroll_id))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        self.cursors.lock().unwrap().remove(scroll_id);
        self.cleared.lock().unwrap().push(scroll_id.to_string());
        Ok(())
    }

    async fn bulk(&self, operations: &[IndexOperation]) -> Result<BulkSummary, SearchError> {
        let in_flight = self.bulk_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_bulk_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.bulk_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.bulk_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.bulk_calls.lock().unwrap().push(operations.to_vec());

        let result = self
            .bulk_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BulkSummary::success(operations.len())));

        if result.is_ok() {
            let mut documents = self.documents.lock().unwrap();
            documents.extend(operations.iter().map(|op| op.source.clone()));
        }
        result
    }
}
