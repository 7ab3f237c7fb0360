//! Search error types.
//!
//! This module defines the error types that can occur while talking to the
//! search engine.

use thiserror::Error;

/// Errors that can occur during search engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No usable connection to the cluster (no nodes reachable, wrong
    /// cluster, or the connection was closed).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A search request could not be executed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Opening, advancing or releasing a scroll cursor failed.
    #[error("Scroll error: {0}")]
    ScrollError(String),

    /// A bulk request could not be sent or was rejected as a whole.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to parse a response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize a request body.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a scroll error.
    pub fn scroll(msg: impl Into<String>) -> Self {
        Self::ScrollError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Whether the failure is transient, i.e. sending the same request again
    /// may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_)
            | Self::QueryError(_)
            | Self::ScrollError(_)
            | Self::BulkIndexError(_)
            | Self::ParseError(_) => true,
            Self::SerializationError(_) => false,
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
