//! Error types for the relation index pipeline.

use relation_index_repository::SearchError;
use thiserror::Error;

/// Errors that can occur in the relation index pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the search engine, including connectivity failures.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// Error from the bulk loader.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Channel communication error with a background task.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl PipelineError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }
}
