//! Loader module for the relation index pipeline.
//!
//! Buffers index operations and writes them to the search engine in bulk
//! requests from a single background worker.

mod backoff;

pub use backoff::BackoffPolicy;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use relation_index_repository::{IndexLayout, IndexOperation, SearchEngineClient};
use relation_index_shared::RelationDocument;

/// Configuration for the bulk indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkConfig {
    /// Number of buffered operations that triggers a flush.
    pub max_actions: usize,
    /// Buffered body size in bytes that triggers a flush.
    pub max_bytes: usize,
    /// Maximum time a non-empty buffer waits before being flushed.
    pub flush_interval: Duration,
    /// Retry schedule for bulk requests that fail as a whole.
    pub backoff: BackoffPolicy,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_actions: 10_000,
            max_bytes: 1 << 30,
            flush_interval: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BulkConfig {
    pub fn with_max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Counters describing what the indexer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    /// Bulk requests that reached the engine.
    pub batches_flushed: u64,
    /// Operations the engine accepted.
    pub operations_flushed: u64,
    /// Operations the engine rejected individually.
    pub failed_items: u64,
    /// Batches given up on after exhausting retries.
    pub batches_dropped: u64,
    /// Operations lost with dropped batches.
    pub operations_dropped: u64,
}

#[derive(Default)]
struct BulkCounters {
    batches_flushed: AtomicU64,
    operations_flushed: AtomicU64,
    failed_items: AtomicU64,
    batches_dropped: AtomicU64,
    operations_dropped: AtomicU64,
}

impl BulkCounters {
    fn snapshot(&self) -> BulkStats {
        BulkStats {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            operations_flushed: self.operations_flushed.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            operations_dropped: self.operations_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Operations waiting for the next flush.
#[derive(Default)]
struct PendingBatch {
    operations: Vec<IndexOperation>,
    size_bytes: usize,
}

impl PendingBatch {
    fn push(&mut self, operation: IndexOperation) {
        self.size_bytes += operation.size_bytes();
        self.operations.push(operation);
    }

    fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// An empty batch is never full, whatever the thresholds.
    fn is_full(&self, config: &BulkConfig) -> bool {
        !self.is_empty()
            && (self.operations.len() >= config.max_actions
                || self.size_bytes >= config.max_bytes)
    }
}

#[derive(Debug, Clone, Copy)]
enum FlushTrigger {
    Size,
    Interval,
    Manual,
    Shutdown,
}

enum Command {
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// State shared between the handle and the worker task.
struct Shared {
    client: Arc<dyn SearchEngineClient>,
    config: BulkConfig,
    batch: Mutex<PendingBatch>,
    closed: AtomicBool,
    wake: Notify,
    counters: BulkCounters,
}

impl Shared {
    fn lock_batch(&self) -> MutexGuard<'_, PendingBatch> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batch_is_full(&self) -> bool {
        self.lock_batch().is_full(&self.config)
    }

    /// Swap the pending batch for an empty one and send it.
    async fn flush_pending(&self, trigger: FlushTrigger) {
        let batch = std::mem::take(&mut *self.lock_batch());
        if batch.is_empty() {
            return;
        }

        debug!(
            ?trigger,
            count = batch.operations.len(),
            size_bytes = batch.size_bytes,
            "Flushing bulk batch"
        );
        self.send_with_retry(batch.operations).await;
    }

    /// Send one batch, retrying whole-request failures with backoff.
    ///
    /// Items the engine rejects individually are logged and counted, never
    /// retried. A batch that fails every attempt is dropped.
    async fn send_with_retry(&self, operations: Vec<IndexOperation>) {
        let count = operations.len() as u64;
        let policy = &self.config.backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.client.bulk(&operations).await {
                Ok(summary) => {
                    if attempt > 1 {
                        info!(attempt, count, "Bulk flush succeeded after retry");
                    }
                    self.counters.batches_flushed.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .operations_flushed
                        .fetch_add(summary.succeeded() as u64, Ordering::Relaxed);

                    if summary.has_failures() {
                        self.counters
                            .failed_items
                            .fetch_add(summary.failures.len() as u64, Ordering::Relaxed);
                        error!(
                            failed = summary.failures.len(),
                            count,
                            message = %summary.failure_message(),
                            "Bulk flush completed with item failures"
                        );
                    } else {
                        debug!(count, took_ms = summary.took_ms, "Bulk flush completed");
                    }
                    return;
                }
                Err(e) => {
                    let delay = if e.is_retryable() {
                        policy.delay_after(attempt)
                    } else {
                        None
                    };

                    match delay {
                        Some(delay) => {
                            warn!(
                                attempt,
                                max_attempts = policy.max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Bulk flush failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(attempt, count, error = %e, "Bulk flush failed, dropping batch");
                            self.counters.batches_dropped.fetch_add(1, Ordering::Relaxed);
                            self.counters
                                .operations_dropped
                                .fetch_add(count, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// The worker loop. It is the only sender of bulk requests, which caps
/// in-flight flushes at one.
async fn run_worker(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    first_tick: Instant,
) {
    let mut ticker = tokio::time::interval_at(first_tick, shared.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.wake.notified() => {
                // Producers may refill the batch past the threshold during a flush.
                while shared.batch_is_full() {
                    shared.flush_pending(FlushTrigger::Size).await;
                }
            }
            _ = ticker.tick() => {
                shared.flush_pending(FlushTrigger::Interval).await;
            }
            command = commands.recv() => match command {
                Some(Command::Flush(done)) => {
                    shared.flush_pending(FlushTrigger::Manual).await;
                    let _ = done.send(());
                }
                Some(Command::Shutdown(done)) => {
                    shared.flush_pending(FlushTrigger::Shutdown).await;
                    let _ = done.send(());
                    break;
                }
                None => {
                    // Every handle is gone; write out what is left.
                    shared.flush_pending(FlushTrigger::Shutdown).await;
                    break;
                }
            }
        }
    }

    debug!("Bulk worker stopped");
}

/// Buffered bulk writer.
///
/// `submit` appends to an in-memory batch and returns immediately. A
/// background worker flushes the batch when it reaches `max_actions`
/// operations or `max_bytes` bytes, and every `flush_interval` while it is
/// non-empty. Must be started inside a tokio runtime.
pub struct BulkIndexer {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BulkIndexer {
    /// Start the indexer and its background worker.
    pub fn start(client: Arc<dyn SearchEngineClient>, config: BulkConfig) -> Self {
        info!(
            max_actions = config.max_actions,
            max_bytes = config.max_bytes,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            max_attempts = config.backoff.max_attempts,
            "Starting bulk indexer"
        );

        let first_tick = Instant::now() + config.flush_interval;
        let shared = Arc::new(Shared {
            client,
            config,
            batch: Mutex::new(PendingBatch::default()),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
            counters: BulkCounters::default(),
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(shared.clone(), receiver, first_tick));

        Self {
            shared,
            commands,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue an operation. Never waits for a flush.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The operation is buffered
    /// * `Err(PipelineError::LoaderError)` - The indexer was shut down
    pub fn submit(&self, operation: IndexOperation) -> Result<(), PipelineError> {
        let full = {
            let mut batch = self.shared.lock_batch();
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(PipelineError::loader("bulk indexer is shut down"));
            }
            batch.push(operation);
            batch.is_full(&self.shared.config)
        };

        if full {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Queue a relation document for the layout's write index.
    pub fn submit_relation(
        &self,
        layout: &IndexLayout,
        document: &RelationDocument,
    ) -> Result<(), PipelineError> {
        let operation = IndexOperation::relation(layout, document)?;
        self.submit(operation)
    }

    /// Number of operations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.lock_batch().operations.len()
    }

    pub fn stats(&self) -> BulkStats {
        self.shared.counters.snapshot()
    }

    /// Flush the pending batch now and wait until it has been sent (or
    /// dropped after exhausting retries).
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let (done, finished) = oneshot::channel();
        self.commands
            .send(Command::Flush(done))
            .map_err(|_| PipelineError::channel("bulk worker has stopped"))?;
        finished
            .await
            .map_err(|_| PipelineError::channel("bulk worker stopped before flushing"))
    }

    /// Flush what is left and stop the worker. Later calls do nothing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };

        {
            let _batch = self.shared.lock_batch();
            self.shared.closed.store(true, Ordering::Release);
        }

        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }
        worker
            .await
            .map_err(|e| PipelineError::loader(format!("bulk worker failed: {}", e)))?;

        let stats = self.stats();
        info!(
            batches_flushed = stats.batches_flushed,
            operations_flushed = stats.operations_flushed,
            failed_items = stats.failed_items,
            batches_dropped = stats.batches_dropped,
            "Bulk indexer shut down"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSearchClient;
    use relation_index_repository::{BulkItemFailure, BulkSummary, SearchError, SearchRequest};
    use serde_json::json;

    fn operation(n: usize) -> IndexOperation {
        IndexOperation::new("wikipedia-index", "wikipedia-entity", json!({ "n": n }))
    }

    fn transport_error() -> SearchError {
        SearchError::bulk_index("connection reset by peer")
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_actions_triggers_one_flush() {
        let client = Arc::new(MockSearchClient::new());
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        for n in 0..10_000 {
            indexer.submit(operation(n)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(client.bulk_call_count(), 1);
        assert_eq!(client.bulk_calls()[0].len(), 10_000);
        assert_eq!(indexer.pending(), 0);

        // Nothing left for the timer.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(client.bulk_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_max_actions_waits_for_timer() {
        let client = Arc::new(MockSearchClient::new());
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        for n in 0..9_999 {
            indexer.submit(operation(n)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(client.bulk_call_count(), 0);
        assert_eq!(indexer.pending(), 9_999);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flushes_single_operation() {
        let client = Arc::new(MockSearchClient::new());
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.submit(operation(1)).unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(client.bulk_call_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(client.bulk_call_count(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(client.bulk_call_count(), 1);
        assert_eq!(indexer.stats().operations_flushed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_bytes_triggers_flush() {
        let client = Arc::new(MockSearchClient::new());
        let config = BulkConfig::default().with_max_bytes(100);
        let indexer = BulkIndexer::start(client.clone(), config);

        let big = IndexOperation::new("idx", "t", json!({ "text": "x".repeat(120) }));
        indexer.submit(big).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(client.bulk_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_thresholds_do_not_stall_worker() {
        let client = Arc::new(MockSearchClient::new());
        let config = BulkConfig::default()
            .with_max_actions(0)
            .with_max_bytes(0);
        let indexer = BulkIndexer::start(client.clone(), config);

        indexer.submit(operation(1)).unwrap();
        tokio::time::timeout(Duration::from_secs(3), indexer.flush())
            .await
            .expect("worker stalled on an empty batch")
            .unwrap();
        indexer.submit(operation(2)).unwrap();
        tokio::time::timeout(Duration::from_secs(3), indexer.shutdown())
            .await
            .expect("worker stalled on an empty batch")
            .unwrap();

        assert_eq!(client.bulk_call_count(), 2);
        assert_eq!(indexer.stats().operations_flushed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_flush_in_flight() {
        let client = Arc::new(MockSearchClient::new());
        client.set_bulk_delay(Duration::from_millis(50));
        let config = BulkConfig::default().with_max_actions(10);
        let indexer = BulkIndexer::start(client.clone(), config);

        for n in 0..10 {
            indexer.submit(operation(n)).unwrap();
        }
        // The first flush is now waiting on the engine.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.bulk_in_flight(), 1);

        for n in 10..40 {
            indexer.submit(operation(n)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.bulk_in_flight(), 1);

        indexer.flush().await.unwrap();
        indexer.shutdown().await.unwrap();

        assert_eq!(client.peak_bulk_in_flight(), 1);
        assert!(client.bulk_call_count() >= 2);
        assert_eq!(indexer.stats().operations_flushed, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_dropped_after_three_transport_failures() {
        let client = Arc::new(MockSearchClient::new());
        for _ in 0..3 {
            client.push_bulk_result(Err(transport_error()));
        }
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.submit(operation(1)).unwrap();
        indexer.submit(operation(2)).unwrap();
        indexer.flush().await.unwrap();

        assert_eq!(client.bulk_call_count(), 3);
        let stats = indexer.stats();
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.operations_dropped, 2);
        assert_eq!(stats.batches_flushed, 0);

        // Dropped, not requeued.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.bulk_call_count(), 3);
        assert_eq!(indexer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_with_backoff() {
        let client = Arc::new(MockSearchClient::new());
        for _ in 0..3 {
            client.push_bulk_result(Err(transport_error()));
        }
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.submit(operation(1)).unwrap();
        let started = Instant::now();
        indexer.flush().await.unwrap();

        // 100ms after the first failure, 200ms after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delivers_exactly_once() {
        let client = Arc::new(MockSearchClient::new());
        client.push_bulk_result(Err(transport_error()));
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        for n in 0..5 {
            indexer.submit(operation(n)).unwrap();
        }
        indexer.flush().await.unwrap();

        assert_eq!(client.bulk_call_count(), 2);
        assert_eq!(client.document_count(), 5);
        let stats = indexer.stats();
        assert_eq!(stats.batches_flushed, 1);
        assert_eq!(stats.operations_flushed, 5);
        assert_eq!(stats.batches_dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_is_not_retried() {
        let client = Arc::new(MockSearchClient::new());
        client.push_bulk_result(Err(SearchError::serialization("invalid body")));
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.submit(operation(1)).unwrap();
        indexer.flush().await.unwrap();

        assert_eq!(client.bulk_call_count(), 1);
        assert_eq!(indexer.stats().batches_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_failures_are_logged_not_retried() {
        let client = Arc::new(MockSearchClient::new());
        client.push_bulk_result(Ok(BulkSummary {
            took_ms: 4,
            total: 3,
            failures: vec![BulkItemFailure {
                position: 2,
                index: "wikipedia-index".to_string(),
                id: None,
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
            }],
        }));
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        for n in 0..3 {
            indexer.submit(operation(n)).unwrap();
        }
        indexer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(client.bulk_call_count(), 1);
        let stats = indexer.stats();
        assert_eq!(stats.failed_items, 1);
        assert_eq!(stats.operations_flushed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_remaining_and_is_idempotent() {
        let client = Arc::new(MockSearchClient::new());
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.submit(operation(1)).unwrap();
        indexer.submit(operation(2)).unwrap();
        indexer.shutdown().await.unwrap();

        assert_eq!(client.bulk_call_count(), 1);
        assert_eq!(client.bulk_calls()[0].len(), 2);

        indexer.shutdown().await.unwrap();
        assert_eq!(client.bulk_call_count(), 1);

        assert!(indexer.submit(operation(3)).is_err());
        assert!(indexer.flush().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_flush_sends_nothing() {
        let client = Arc::new(MockSearchClient::new());
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        indexer.flush().await.unwrap();
        indexer.shutdown().await.unwrap();

        assert_eq!(client.bulk_call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        let client = Arc::new(MockSearchClient::new());
        let config = BulkConfig::default().with_max_actions(128);
        let indexer = Arc::new(BulkIndexer::start(client.clone(), config));

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let indexer = indexer.clone();
                tokio::spawn(async move {
                    for n in 0..500 {
                        indexer.submit(operation(producer * 1000 + n)).unwrap();
                        if n % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        indexer.shutdown().await.unwrap();

        let mut seen: Vec<u64> = client
            .bulk_calls()
            .iter()
            .flatten()
            .map(|op| op.source["n"].as_u64().unwrap())
            .collect();
        seen.sort_unstable();
        let before = seen.len();
        seen.dedup();

        assert_eq!(before, 2000);
        assert_eq!(seen.len(), 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relation_document_round_trip() {
        let client = Arc::new(MockSearchClient::new());
        let layout = IndexLayout::default();
        let indexer = BulkIndexer::start(client.clone(), BulkConfig::default());

        let document = RelationDocument::new("Paris is the capital of France.", "Q90", "Paris")
            .with_relation("Q142", "P1376", "capital of")
            .with_relation("Q142", "P17", "of France");
        indexer.submit_relation(&layout, &document).unwrap();
        indexer.flush().await.unwrap();

        let request = SearchRequest::new(
            &layout.write_index,
            &layout.write_type,
            json!({ "bool": { "must": [ { "term": { "subject-id": "Q90" } } ] } }),
        );
        let page = client.search(&request).await.unwrap();

        assert_eq!(page.total_hits, 1);
        let fetched: RelationDocument = serde_json::from_value(page.hits[0].source()).unwrap();
        assert_eq!(fetched, document);
    }
}
