//! # Relation Index Shared
//!
//! Domain types shared between the repository, the pipeline and the binary:
//! knowledge-base items and properties, relation references, the relation
//! documents written back to the index, and the tagged outcome of a lookup.

pub mod entity;
pub mod outcome;
pub mod relation;

pub use entity::{Item, Property};
pub use outcome::LookupOutcome;
pub use relation::{RelationDocument, RelationReference, WIKIBASE_ENTITY_DATA_TYPE};
