//! Error types for the relation index repository.

mod search_error;

pub use search_error::SearchError;
