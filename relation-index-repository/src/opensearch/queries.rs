//! Query builders.
//!
//! Every lookup is a boolean conjunction of exact term filters; no relevance
//! scoring is involved.

use serde_json::{json, Map, Value};

use relation_index_shared::WIKIBASE_ENTITY_DATA_TYPE;

/// Fields returned for item and property lookups.
pub const ENTITY_FIELDS: [&str; 5] = ["id", "type", "org_label", "label", "wikipedia_title"];

/// Fields returned for relation lookups and scans.
pub const RELATION_FIELDS: [&str; 1] = ["property_id"];

/// Build a `bool` query whose `must` clauses are one `term` filter per
/// `(field, value)` pair.
pub fn term_conjunction(terms: &[(&str, &str)]) -> Value {
    let must: Vec<Value> = terms
        .iter()
        .map(|(field, value)| {
            let mut term = Map::new();
            term.insert((*field).to_string(), Value::from(*value));
            json!({ "term": term })
        })
        .collect();

    json!({
        "bool": {
            "must": must
        }
    })
}

/// Items with the given Wikipedia title.
pub fn item_by_wikipedia_title(wikipedia_title: &str) -> Value {
    term_conjunction(&[("type", "item"), ("wikipedia_title", wikipedia_title)])
}

/// Every alias document of a property.
pub fn property_by_id(property_id: &str) -> Value {
    term_conjunction(&[("type", "property"), ("id", property_id)])
}

/// Relation statements connecting `entity_id` to the entity `object_id`.
pub fn relations_between(entity_id: &str, object_id: &str) -> Value {
    term_conjunction(&[
        ("entity_id", entity_id),
        ("data_type", WIKIBASE_ENTITY_DATA_TYPE),
        ("data_value", object_id),
    ])
}

/// Every relation statement whose value is an entity.
pub fn entity_valued_relations() -> Value {
    term_conjunction(&[("data_type", WIKIBASE_ENTITY_DATA_TYPE)])
}
