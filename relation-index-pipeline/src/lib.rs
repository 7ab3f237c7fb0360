//! # Relation Index Pipeline
//!
//! This crate provides the components that sit on top of the search engine
//! client:
//!
//! 1. **ConnectionManager**: Connects once, verifies the cluster, owns the shared client
//! 2. **QueryService**: Item, property and relation term lookups
//! 3. **ScrollCursor**: Full-corpus scans over a server-side cursor
//! 4. **BulkIndexer**: Buffered, background-flushed bulk writes with retry

pub mod config;
pub mod connection;
pub mod errors;
pub mod loader;
pub mod lookup;
pub mod scan;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServiceConfig;
pub use connection::ConnectionManager;
pub use errors::PipelineError;
pub use loader::{BackoffPolicy, BulkConfig, BulkIndexer, BulkStats};
pub use lookup::{Lookup, QueryService};
pub use scan::{ScanOutcome, ScrollConfig, ScrollCursor};
