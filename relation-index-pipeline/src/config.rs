//! Aggregate configuration for the relation index services.

use relation_index_repository::{ConnectionConfig, IndexLayout};

use crate::loader::BulkConfig;
use crate::scan::ScrollConfig;

/// Everything the services read at construction time.
///
/// Read once; changing it afterwards has no effect on running services.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub connection: ConnectionConfig,
    pub layout: IndexLayout,
    pub bulk: BulkConfig,
    pub scroll: ScrollConfig,
}

impl ServiceConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: IndexLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollConfig) -> Self {
        self.scroll = scroll;
        self
    }
}
