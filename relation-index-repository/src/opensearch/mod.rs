//! OpenSearch implementation of the search engine client.
//!
//! This module provides a concrete implementation of `SearchEngineClient`
//! using OpenSearch as the backend, plus the term-query builders shared by
//! every lookup.

mod client;
pub mod queries;

pub use client::OpenSearchClient;
