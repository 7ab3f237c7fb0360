//! Relation types: references between entities and extracted relation documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Data type of relation statements whose value is another entity.
pub const WIKIBASE_ENTITY_DATA_TYPE: &str = "wikibase-entityid";

/// A relation statement stored in the index: `entity_id` is connected to
/// `data_value` through `property_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationReference {
    pub entity_id: String,
    pub property_id: String,
    pub data_type: String,
    pub data_value: String,
}

impl RelationReference {
    /// A reference whose value is another entity.
    pub fn entity(
        entity_id: impl Into<String>,
        property_id: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            property_id: property_id.into(),
            data_type: WIKIBASE_ENTITY_DATA_TYPE.to_string(),
            data_value: object_id.into(),
        }
    }
}

/// A relation extracted from one sentence, ready to be written to the index.
///
/// `objects` maps each object entity id to the properties connecting the
/// subject to it, each with the surface text that expressed it. Serializes
/// to the hyphenated document shape:
///
/// ```json
/// {
///   "sentence": "...",
///   "subject-id": "Q90",
///   "subject-label": "Paris",
///   "objects": [
///     { "object-id": "Q142", "relations": [ { "property-id": "P17", "surface": "capital of" } ] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RelationDocumentBody", from = "RelationDocumentBody")]
pub struct RelationDocument {
    pub sentence: String,
    pub subject_id: String,
    pub subject_label: String,
    pub objects: BTreeMap<String, BTreeMap<String, String>>,
}

impl RelationDocument {
    pub fn new(
        sentence: impl Into<String>,
        subject_id: impl Into<String>,
        subject_label: impl Into<String>,
    ) -> Self {
        Self {
            sentence: sentence.into(),
            subject_id: subject_id.into(),
            subject_label: subject_label.into(),
            objects: BTreeMap::new(),
        }
    }

    /// Record that `property_id` connects the subject to `object_id`.
    pub fn with_relation(
        mut self,
        object_id: impl Into<String>,
        property_id: impl Into<String>,
        surface: impl Into<String>,
    ) -> Self {
        self.objects
            .entry(object_id.into())
            .or_default()
            .insert(property_id.into(), surface.into());
        self
    }

    /// Total number of (object, property) pairs.
    pub fn relation_count(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationDocumentBody {
    sentence: String,
    #[serde(rename = "subject-id")]
    subject_id: String,
    #[serde(rename = "subject-label")]
    subject_label: String,
    #[serde(default)]
    objects: Vec<ObjectRelationsBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectRelationsBody {
    #[serde(rename = "object-id")]
    object_id: String,
    #[serde(default)]
    relations: Vec<SurfaceRelationBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurfaceRelationBody {
    #[serde(rename = "property-id")]
    property_id: String,
    surface: String,
}

impl From<RelationDocument> for RelationDocumentBody {
    fn from(document: RelationDocument) -> Self {
        let objects = document
            .objects
            .into_iter()
            .map(|(object_id, relations)| ObjectRelationsBody {
                object_id,
                relations: relations
                    .into_iter()
                    .map(|(property_id, surface)| SurfaceRelationBody {
                        property_id,
                        surface,
                    })
                    .collect(),
            })
            .collect();

        Self {
            sentence: document.sentence,
            subject_id: document.subject_id,
            subject_label: document.subject_label,
            objects,
        }
    }
}

impl From<RelationDocumentBody> for RelationDocument {
    fn from(body: RelationDocumentBody) -> Self {
        let mut objects: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for object in body.objects {
            let relations = objects.entry(object.object_id).or_default();
            for relation in object.relations {
                relations.insert(relation.property_id, relation.surface);
            }
        }

        Self {
            sentence: body.sentence,
            subject_id: body.subject_id,
            subject_label: body.subject_label,
            objects,
        }
    }
}
