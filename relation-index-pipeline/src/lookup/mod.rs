//! Lookup module for the relation index pipeline.
//!
//! Term lookups of items, properties and relations. Every lookup exists in
//! two forms: a strict one returning a [`Lookup`] that tells "nothing
//! matched" apart from "the query failed", and a lenient one that logs
//! failures and answers with the not-found value.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use relation_index_repository::opensearch::queries;
use relation_index_repository::{
    IndexLayout, SearchEngineClient, SearchError, SearchPage, SearchRequest,
};
use relation_index_shared::{Item, LookupOutcome, Property, RelationReference};

use crate::scan::{ScanOutcome, ScrollConfig, ScrollCursor};

/// Outcome of a lookup against the search engine.
pub type Lookup<T> = LookupOutcome<T, SearchError>;

/// Window for item lookups; titles are unique.
const ITEM_WINDOW: usize = 1;

/// Window for property lookups; one document per alias.
const PROPERTY_WINDOW: usize = 1000;

/// Window for relation lookups between two entities.
const RELATION_WINDOW: usize = 1000;

/// Typed term lookups over the shared connection.
#[derive(Clone)]
pub struct QueryService {
    client: Arc<dyn SearchEngineClient>,
    layout: IndexLayout,
}

impl QueryService {
    pub fn new(client: Arc<dyn SearchEngineClient>, layout: IndexLayout) -> Self {
        Self { client, layout }
    }

    fn entity_request(&self, query: serde_json::Value, size: usize) -> SearchRequest {
        SearchRequest::new(
            &self.layout.index_name,
            &self.layout.entity_type_name,
            query,
        )
        .with_fields(queries::ENTITY_FIELDS)
        .with_size(size)
    }

    fn relation_request(&self, query: serde_json::Value, size: usize) -> SearchRequest {
        SearchRequest::new(
            &self.layout.index_name,
            &self.layout.relation_type_name,
            query,
        )
        .with_fields(queries::RELATION_FIELDS)
        .with_size(size)
    }

    /// Run a search and apply the validity rule: a response is usable only
    /// if its total hit count is above zero.
    async fn execute(&self, request: &SearchRequest) -> Lookup<SearchPage> {
        match self.client.search(request).await {
            Ok(page) if page.is_valid() => LookupOutcome::Found(page),
            Ok(_) => LookupOutcome::NotFound,
            Err(e) => LookupOutcome::Failed(e),
        }
    }

    fn lenient<T: Default>(operation: &'static str, outcome: Lookup<T>) -> T {
        if let Some(error) = outcome.failure() {
            warn!(operation, error = %error, "Lookup failed, treating as not found");
        }
        outcome.unwrap_or_default()
    }

    fn lenient_exists<T>(operation: &'static str, outcome: Lookup<T>) -> bool {
        if let Some(error) = outcome.failure() {
            warn!(operation, error = %error, "Lookup failed, treating as absent");
        }
        outcome.is_found()
    }

    /// Resolve the item with the given Wikipedia title.
    #[instrument(skip(self))]
    pub async fn lookup_item(&self, wikipedia_title: &str) -> Lookup<Item> {
        let request = self.entity_request(
            queries::item_by_wikipedia_title(wikipedia_title),
            ITEM_WINDOW,
        );

        self.execute(&request).await.map(|page| {
            let id = page
                .hits
                .first()
                .and_then(|hit| hit.field_str("id"))
                .unwrap_or_default();
            Item::new(id, wikipedia_title)
        })
    }

    /// Id of the item with the given Wikipedia title.
    pub async fn lookup_item_id(&self, wikipedia_title: &str) -> Lookup<String> {
        self.lookup_item(wikipedia_title).await.map(|item| item.id)
    }

    /// Id of the item with the given Wikipedia title, or `""`.
    pub async fn find_item_id(&self, wikipedia_title: &str) -> String {
        Self::lenient("find_item_id", self.lookup_item_id(wikipedia_title).await)
    }

    /// Whether an item with the given Wikipedia title is indexed.
    pub async fn item_exists(&self, wikipedia_title: &str) -> bool {
        Self::lenient_exists("item_exists", self.lookup_item(wikipedia_title).await)
    }

    /// Resolve a property with all of its aliases.
    ///
    /// The label comes from the first hit's `org_label`; every hit
    /// contributes its `label` to the aliases, in the order the engine
    /// returned them.
    #[instrument(skip(self))]
    pub async fn lookup_property(&self, property_id: &str) -> Lookup<Property> {
        let request = self.entity_request(queries::property_by_id(property_id), PROPERTY_WINDOW);

        self.execute(&request).await.map(|page| {
            let mut property = Property {
                id: property_id.to_string(),
                ..Property::default()
            };

            for (position, hit) in page.hits.iter().enumerate() {
                if position == 0 {
                    property.label = hit.field_str("org_label").unwrap_or_default();
                }
                match hit.field_str("label") {
                    Some(alias) => property.aliases.push(alias),
                    None => debug!(property_id, position, "Property document has no label"),
                }
            }
            property
        })
    }

    /// The property with its aliases, or an empty property.
    pub async fn get_property(&self, property_id: &str) -> Property {
        Self::lenient("get_property", self.lookup_property(property_id).await)
    }

    /// Whether any document is indexed for the property.
    pub async fn property_exists(&self, property_id: &str) -> bool {
        let request = self.entity_request(queries::property_by_id(property_id), PROPERTY_WINDOW);
        Self::lenient_exists("property_exists", self.execute(&request).await)
    }

    /// Entity-valued relation statements from `entity_id` to `object_id`,
    /// duplicates kept, in engine order.
    #[instrument(skip(self))]
    pub async fn lookup_relations(
        &self,
        entity_id: &str,
        object_id: &str,
    ) -> Lookup<Vec<RelationReference>> {
        let request = self.relation_request(
            queries::relations_between(entity_id, object_id),
            RELATION_WINDOW,
        );

        // The query pins subject, data type and value; only the property varies.
        self.execute(&request).await.map(|page| {
            page.hits
                .iter()
                .filter_map(|hit| hit.field_str("property_id"))
                .map(|property_id| RelationReference::entity(entity_id, property_id, object_id))
                .collect()
        })
    }

    /// Ids of every property connecting `entity_id` to the entity
    /// `object_id`, duplicates kept, in engine order.
    pub async fn lookup_relation_property_ids(
        &self,
        entity_id: &str,
        object_id: &str,
    ) -> Lookup<Vec<String>> {
        self.lookup_relations(entity_id, object_id)
            .await
            .map(|relations| relations.into_iter().map(|r| r.property_id).collect())
    }

    /// Relation property ids between two entities, or an empty list.
    pub async fn get_relation_property_ids(&self, entity_id: &str, object_id: &str) -> Vec<String> {
        Self::lenient(
            "get_relation_property_ids",
            self.lookup_relation_property_ids(entity_id, object_id).await,
        )
    }

    /// Scan every entity-valued relation and collect the distinct property
    /// ids referenced anywhere in the corpus.
    pub async fn related_property_ids(&self, config: &ScrollConfig) -> ScanOutcome {
        let request = self.relation_request(queries::entity_valued_relations(), config.page_size);
        ScrollCursor::new(self.client.clone(), request, config.keep_alive)
            .collect_field("property_id")
            .await
    }
}
