//! Settings read from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use relation_index_pipeline::{BulkConfig, ServiceConfig};
use relation_index_repository::config::{
    DEFAULT_ENTITY_TYPE_NAME, DEFAULT_HOST, DEFAULT_INDEX_NAME, DEFAULT_PORT,
    DEFAULT_RELATION_TYPE_NAME, DEFAULT_WRITE_INDEX, DEFAULT_WRITE_TYPE,
};
use relation_index_repository::{ConnectionConfig, IndexLayout};

use crate::report::DEFAULT_REPORT_PATH;
use crate::AppError;

/// Everything the binary needs to run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceConfig,
    pub report_path: PathBuf,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ES_HOST`: Engine host (default: localhost)
    /// - `ES_PORT`: Engine HTTP port (default: 9200)
    /// - `ES_CLUSTER_NAME`: Expected cluster name (default: not checked)
    /// - `ES_INDEX_NAME`: Index of items, properties and relations (default: wikidata-index)
    /// - `ES_ENTITY_TYPE_NAME`: Item and property document type (default: wikidata-entity)
    /// - `ES_RELATION_TYPE_NAME`: Relation document type (default: wikidata-claim)
    /// - `ES_WRITE_INDEX`: Index receiving relation documents (default: wikipedia-index)
    /// - `ES_WRITE_TYPE`: Relation document write type (default: wikipedia-entity)
    /// - `ES_BULK_FLUSH_MAX_ACTIONS`: Operations per bulk request (default: 10000)
    /// - `REPORT_PATH`: Report file (default: related-properties-result.txt)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mut connection = ConnectionConfig::new(
            text("ES_HOST", DEFAULT_HOST),
            parse_or(&lookup, "ES_PORT", DEFAULT_PORT)?,
        );
        if let Some(cluster_name) = lookup("ES_CLUSTER_NAME").filter(|name| !name.is_empty()) {
            connection = connection.with_cluster_name(cluster_name);
        }

        let layout = IndexLayout {
            index_name: text("ES_INDEX_NAME", DEFAULT_INDEX_NAME),
            entity_type_name: text("ES_ENTITY_TYPE_NAME", DEFAULT_ENTITY_TYPE_NAME),
            relation_type_name: text("ES_RELATION_TYPE_NAME", DEFAULT_RELATION_TYPE_NAME),
            write_index: text("ES_WRITE_INDEX", DEFAULT_WRITE_INDEX),
            write_type: text("ES_WRITE_TYPE", DEFAULT_WRITE_TYPE),
        };

        let defaults = BulkConfig::default();
        let max_actions = parse_or(&lookup, "ES_BULK_FLUSH_MAX_ACTIONS", defaults.max_actions)?;
        if max_actions == 0 {
            return Err(AppError::config("ES_BULK_FLUSH_MAX_ACTIONS must be at least 1"));
        }

        let service = ServiceConfig::new(connection)
            .with_layout(layout)
            .with_bulk(defaults.with_max_actions(max_actions));

        Ok(Self {
            service,
            report_path: PathBuf::from(text("REPORT_PATH", DEFAULT_REPORT_PATH)),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {} '{}': {}", key, value, e))),
        None => Ok(default),
    }
}
