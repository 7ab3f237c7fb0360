//! # Relation Index
//!
//! Library side of the `relation-index` tool: environment [`Settings`],
//! the [`Dependencies`] wiring around one verified connection, and the
//! related property availability [`report`].

pub mod config;
pub mod report;

pub use config::{Dependencies, Settings};

use relation_index_pipeline::PipelineError;
use relation_index_repository::SearchError;
use thiserror::Error;

/// Why a run of the tool stopped.
#[derive(Error, Debug)]
pub enum AppError {
    /// An environment variable is missing a usable value.
    #[error("Invalid setting: {0}")]
    ConfigError(String),

    /// Connecting, scanning or looking up properties failed.
    #[error("Search engine failure: {0}")]
    SearchError(#[from] SearchError),

    /// The bulk writer could not be flushed or stopped cleanly.
    #[error("Relation writer failure: {0}")]
    PipelineError(#[from] PipelineError),

    /// The report file could not be written.
    #[error("Report not written: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// An invalid setting, named by `msg`.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the cluster could not be reached or verified.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::SearchError(SearchError::ConnectionError(_)))
    }
}
