//! Search index
//!
//! Every persisted entity is also indexed. Additions become visible to
//! readers only after a commit.

pub mod memory;
pub mod solr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::graph::{EntityId, EntityRecord};

pub use memory::MemorySearchIndex;
pub use solr::SolrIndex;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn add(&self, document: &SearchDocument) -> Result<(), StoreError>;

    async fn commit(&self) -> Result<(), StoreError>;

    /// Committed document by id
    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, StoreError>;
}

/// Flattened, Solr-style view of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    #[serde(rename = "kind_ssi")]
    pub kind: String,
    #[serde(rename = "title_tesim", default)]
    pub title: Vec<String>,
    #[serde(rename = "state_ssi", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "visibility_ssi", default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(
        rename = "viewing_direction_ssi",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub viewing_direction: Option<String>,
    #[serde(rename = "member_ids_ssim", default)]
    pub member_ids: Vec<String>,
    #[serde(rename = "ordered_by_ssim", default)]
    pub ordered_by: Vec<String>,
    #[serde(rename = "collection_slugs_ssim", default)]
    pub collections: Vec<String>,
    #[serde(rename = "replaces_ssi", default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(rename = "mime_type_ssim", default)]
    pub mime_types: Vec<String>,
}

impl From<&EntityRecord> for SearchDocument {
    fn from(record: &EntityRecord) -> Self {
        let ids = |ids: &[EntityId]| -> Vec<String> {
            ids.iter().map(|id| id.to_string()).collect()
        };

        let mut doc = SearchDocument {
            id: record.id().to_string(),
            kind: record.kind().as_str().to_string(),
            title: record.title().to_vec(),
            state: None,
            visibility: None,
            viewing_direction: None,
            member_ids: Vec::new(),
            ordered_by: Vec::new(),
            collections: Vec::new(),
            replaces: None,
            mime_types: Vec::new(),
        };

        match record {
            EntityRecord::Work(work) => {
                doc.visibility = Some(work.visibility.as_str().to_string());
                doc.viewing_direction = Some(work.viewing_direction.as_str().to_string());
                doc.member_ids = ids(&work.ordered_member_ids);
                doc.collections = work
                    .member_of_collections
                    .iter()
                    .map(|c| c.slug.clone())
                    .collect();
                doc.replaces = work.replaces.clone();
            },
            EntityRecord::Resource(resource) => {
                doc.state = resource.state.map(|s| s.as_str().to_string());
                doc.visibility = Some(resource.visibility.as_str().to_string());
                doc.viewing_direction = Some(resource.viewing_direction.as_str().to_string());
                doc.member_ids = ids(&resource.member_ids);
                doc.ordered_by = ids(&resource.ordered_by);
                doc.collections = resource
                    .member_of_collections
                    .iter()
                    .map(|c| c.slug.clone())
                    .collect();
                doc.replaces = resource.replaces.clone();
            },
            EntityRecord::FileUnit(unit) => {
                doc.mime_types = unit.files.iter().map(|f| f.mime_type.clone()).collect();
                doc.replaces = unit.replaces.clone();
            },
        }

        doc
    }
}
