//! Connection and index layout configuration.

/// Default engine host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default engine HTTP port.
pub const DEFAULT_PORT: u16 = 9200;

/// Default index holding items, properties and relation statements.
pub const DEFAULT_INDEX_NAME: &str = "wikidata-index";

/// Default document type of items and properties.
pub const DEFAULT_ENTITY_TYPE_NAME: &str = "wikidata-entity";

/// Default document type of relation statements.
pub const DEFAULT_RELATION_TYPE_NAME: &str = "wikidata-claim";

/// Default index receiving extracted relation documents.
pub const DEFAULT_WRITE_INDEX: &str = "wikipedia-index";

/// Default document type of extracted relation documents.
pub const DEFAULT_WRITE_TYPE: &str = "wikipedia-entity";

/// Where the cluster lives and how to recognise it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Expected cluster name. `None` accepts any cluster.
    pub cluster_name: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cluster_name: None,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cluster_name: None,
        }
    }

    /// Require the engine to report this cluster name.
    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = Some(cluster_name.into());
        self
    }

    /// Base URL of the node, e.g. `http://localhost:9200`.
    pub fn url(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Index and document type names used by lookups and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    pub index_name: String,
    pub entity_type_name: String,
    pub relation_type_name: String,
    pub write_index: String,
    pub write_type: String,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            entity_type_name: DEFAULT_ENTITY_TYPE_NAME.to_string(),
            relation_type_name: DEFAULT_RELATION_TYPE_NAME.to_string(),
            write_index: DEFAULT_WRITE_INDEX.to_string(),
            write_type: DEFAULT_WRITE_TYPE.to_string(),
        }
    }
}
