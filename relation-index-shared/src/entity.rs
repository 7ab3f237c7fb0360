//! Knowledge-base entities resolved by term lookups.

use serde::{Deserialize, Serialize};

/// An item document, resolved by its Wikipedia title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub wikipedia_title: String,
}

impl Item {
    pub fn new(id: impl Into<String>, wikipedia_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            wikipedia_title: wikipedia_title.into(),
        }
    }
}

/// A property together with every alias label indexed for it.
///
/// Several alias documents share the same property id. The canonical label
/// comes from the first document returned by the engine, and `aliases`
/// keeps one entry per document in engine order, duplicates included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub label: String,
    pub aliases: Vec<String>,
}

impl Property {
    /// Create a property without aliases.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            aliases: Vec::new(),
        }
    }

    /// Append an alias label.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// The "not found" property: no id, no label, no aliases.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.label.is_empty() && self.aliases.is_empty()
    }
}
