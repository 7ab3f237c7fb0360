//! Request and response types exchanged with the search engine.
//!
//! These are engine-neutral: the OpenSearch client translates them to and
//! from the wire format, and test doubles can build them directly.

use serde_json::{Map, Value};

use crate::config::IndexLayout;
use crate::errors::SearchError;
use relation_index_shared::RelationDocument;

/// A search over one index with an explicit field list and a bounded window.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Index to search.
    pub index: String,
    /// Logical document type. Carried for tracing; the engine has no
    /// mapping types.
    pub doc_type: String,
    /// Query DSL body (the value of the `query` key).
    pub query: Value,
    /// Fields to return for every hit.
    pub fields: Vec<String>,
    /// Maximum number of hits per response.
    pub size: usize,
}

impl SearchRequest {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, query: Value) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            query,
            fields: Vec::new(),
            size: 10,
        }
    }

    /// Set the returned fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the response window size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// A single matching document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHit {
    /// Engine-assigned document id (`_id`).
    pub id: Option<String>,
    /// Returned fields, keyed by field name.
    pub fields: Map<String, Value>,
}

impl SearchHit {
    /// Build a hit from a JSON object of fields. Non-objects yield an empty hit.
    pub fn from_source(source: Value) -> Self {
        let fields = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { id: None, fields }
    }

    /// The field rendered as a string.
    ///
    /// Stored fields come back as single-element arrays, so the first
    /// element of an array is used. Numbers and booleans are stringified.
    pub fn field_str(&self, name: &str) -> Option<String> {
        let value = match self.fields.get(name)? {
            Value::Array(values) => values.first()?,
            value => value,
        };

        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// All returned fields as one JSON object.
    pub fn source(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Total number of matching documents, across all pages.
    pub total_hits: u64,
    /// Hits on this page.
    pub hits: Vec<SearchHit>,
    /// Cursor id to request the next page, for scroll searches.
    pub scroll_id: Option<String>,
}

impl SearchPage {
    pub fn new(total_hits: u64, hits: Vec<SearchHit>) -> Self {
        Self {
            total_hits,
            hits,
            scroll_id: None,
        }
    }

    pub fn with_scroll_id(mut self, scroll_id: impl Into<String>) -> Self {
        self.scroll_id = Some(scroll_id.into());
        self
    }

    /// A page is a usable answer only if something matched.
    pub fn is_valid(&self) -> bool {
        self.total_hits > 0
    }
}

/// A node the client is connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
}

/// Cluster identity and its reachable nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNodes {
    pub cluster_name: String,
    pub nodes: Vec<NodeInfo>,
}

impl ClusterNodes {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A single index action inside a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOperation {
    pub index: String,
    pub doc_type: String,
    pub source: Value,
    size_bytes: usize,
}

impl IndexOperation {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, source: Value) -> Self {
        let size_bytes = source.to_string().len();
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            source,
            size_bytes,
        }
    }

    /// Index a relation document into the layout's write index.
    pub fn relation(layout: &IndexLayout, document: &RelationDocument) -> Result<Self, SearchError> {
        let source = serde_json::to_value(document)?;
        Ok(Self::new(&layout.write_index, &layout.write_type, source))
    }

    /// Serialized size of the document body in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// An item of a bulk request the engine rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    /// Position of the operation within the request.
    pub position: usize,
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    pub reason: String,
}

/// Result of a bulk request that reached the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub took_ms: u64,
    pub total: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkSummary {
    /// A summary where every item succeeded.
    pub fn success(total: usize) -> Self {
        Self {
            took_ms: 0,
            total,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.total.saturating_sub(self.failures.len())
    }

    /// One line per failed item.
    pub fn failure_message(&self) -> String {
        let mut message = String::from("failure in bulk execution:");
        for failure in &self.failures {
            message.push_str(&format!(
                "\n[{}]: index [{}], id [{}], status [{}], message [{}]",
                failure.position,
                failure.index,
                failure.id.as_deref().unwrap_or("-"),
                failure.status,
                failure.reason
            ));
        }
        message
    }
}
