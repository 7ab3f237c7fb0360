//! Connection module for the relation index pipeline.
//!
//! Owns the single engine client shared by every service and the bulk
//! indexer that writes through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use relation_index_repository::{
    ConnectionConfig, OpenSearchClient, SearchEngineClient, SearchError,
};
use relation_index_shared::RelationDocument;

use crate::config::ServiceConfig;
use crate::errors::PipelineError;
use crate::loader::BulkIndexer;
use crate::lookup::QueryService;

/// Builds the engine client for a connection config.
type Connector =
    Box<dyn Fn(&ConnectionConfig) -> Result<Arc<dyn SearchEngineClient>, SearchError> + Send + Sync>;

enum ConnectionState {
    Idle,
    Open(Arc<dyn SearchEngineClient>),
    Closed,
}

/// Lazily connects to the cluster once and hands out the shared client.
///
/// The first call to [`connection`](Self::connection) builds the client and
/// verifies that at least one node answers. Later calls return the same
/// client. [`close`](Self::close) flushes the bulk indexer before letting
/// go of the client.
pub struct ConnectionManager {
    config: ServiceConfig,
    connector: Connector,
    state: Mutex<ConnectionState>,
    bulk: Mutex<Option<Arc<BulkIndexer>>>,
}

impl ConnectionManager {
    /// Manager connecting through the OpenSearch client.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_connector(config, |connection| {
            let client = OpenSearchClient::new(connection)?;
            Ok(Arc::new(client) as Arc<dyn SearchEngineClient>)
        })
    }

    /// Manager connecting through a custom client factory.
    pub fn with_connector<F>(config: ServiceConfig, connector: F) -> Self
    where
        F: Fn(&ConnectionConfig) -> Result<Arc<dyn SearchEngineClient>, SearchError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            config,
            connector: Box::new(connector),
            state: Mutex::new(ConnectionState::Idle),
            bulk: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The shared client, connecting on first use.
    ///
    /// # Returns
    ///
    /// * `Ok(client)` - The verified client, the same one on every call
    /// * `Err(SearchError::ConnectionError)` - No node answered, the
    ///   cluster name did not match, or the manager was closed
    #[instrument(skip(self))]
    pub async fn connection(&self) -> Result<Arc<dyn SearchEngineClient>, SearchError> {
        let mut state = self.state.lock().await;

        match &*state {
            ConnectionState::Open(client) => return Ok(client.clone()),
            ConnectionState::Closed => return Err(SearchError::connection("connection closed")),
            ConnectionState::Idle => {}
        }

        let connection = &self.config.connection;
        let client = (self.connector)(connection)?;
        let cluster = client.cluster_nodes().await?;

        if cluster.is_empty() {
            warn!(url = %connection.url(), "No search engine nodes reachable");
            return Err(SearchError::connection("no nodes reachable"));
        }

        if let Some(expected) = &connection.cluster_name {
            if expected != &cluster.cluster_name {
                return Err(SearchError::connection(format!(
                    "expected cluster {} but connected to {}",
                    expected, cluster.cluster_name
                )));
            }
        }

        info!(
            url = %connection.url(),
            cluster = %cluster.cluster_name,
            nodes = cluster.nodes.len(),
            "Connected to search engine"
        );

        *state = ConnectionState::Open(client.clone());
        Ok(client)
    }

    /// Lookup service over the shared client.
    pub async fn query_service(&self) -> Result<QueryService, SearchError> {
        let client = self.connection().await?;
        Ok(QueryService::new(client, self.config.layout.clone()))
    }

    /// The manager's bulk indexer, started on first use.
    pub async fn bulk_indexer(&self) -> Result<Arc<BulkIndexer>, PipelineError> {
        let mut bulk = self.bulk.lock().await;
        if let Some(indexer) = bulk.as_ref() {
            return Ok(indexer.clone());
        }

        let client = self.connection().await?;
        let indexer = Arc::new(BulkIndexer::start(client, self.config.bulk.clone()));
        *bulk = Some(indexer.clone());
        Ok(indexer)
    }

    /// Queue a relation extracted from `sentence` for indexing.
    ///
    /// `objects` maps each object entity id to the properties linking the
    /// subject to it, each with its surface text.
    pub async fn insert_relation(
        &self,
        sentence: &str,
        subject_id: &str,
        subject_label: &str,
        objects: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<(), PipelineError> {
        let document = RelationDocument {
            sentence: sentence.to_string(),
            subject_id: subject_id.to_string(),
            subject_label: subject_label.to_string(),
            objects,
        };

        self.bulk_indexer()
            .await?
            .submit_relation(&self.config.layout, &document)
    }

    /// Flush and stop the bulk indexer, then release the client.
    ///
    /// Closing an already closed manager does nothing.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), PipelineError> {
        let mut bulk = self.bulk.lock().await;
        if let Some(indexer) = bulk.take() {
            indexer.shutdown().await?;
        }

        let mut state = self.state.lock().await;
        if !matches!(*state, ConnectionState::Closed) {
            *state = ConnectionState::Closed;
            info!("Search engine connection closed");
        }
        Ok(())
    }
}
