//! # Relation Index Repository
//!
//! This crate provides the abstraction over the search engine used by the
//! relation index: errors, wire-level request/response types, the
//! `SearchEngineClient` trait, term-query builders, and a concrete
//! implementation backed by OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::{ConnectionConfig, IndexLayout};
pub use errors::SearchError;
pub use interfaces::SearchEngineClient;
pub use opensearch::OpenSearchClient;
pub use types::{
    BulkItemFailure, BulkSummary, ClusterNodes, IndexOperation, NodeInfo, SearchHit, SearchPage,
    SearchRequest,
};
