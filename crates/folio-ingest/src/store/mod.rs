//! Object store
//!
//! Durable home of entity records, binary content and positional membership.
//! `S3ObjectStore` is the production backend; `MemoryObjectStore` backs tests
//! and `--in-memory` runs.

pub mod config;
pub mod memory;
pub mod s3;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::graph::{EntityId, EntityRecord};

pub use config::StorageConfig;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or replace a record; returns the durable identifier
    async fn put_entity(&self, record: &EntityRecord) -> Result<EntityId, StoreError>;

    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError>;

    /// Store bytes under a key, byte-for-byte
    async fn put_content(&self, key: &str, data: &[u8], mime_type: &str) -> Result<(), StoreError>;

    async fn get_content(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `member` at `position` in the work's membership
    async fn set_member(
        &self,
        work: &EntityId,
        position: usize,
        member: &EntityId,
    ) -> Result<(), StoreError>;

    /// Members in position order
    async fn member_ids(&self, work: &EntityId) -> Result<Vec<EntityId>, StoreError>;

    /// Number of stored entity records
    async fn count(&self) -> Result<usize, StoreError>;
}

pub(crate) fn entity_key(id: &EntityId) -> String {
    format!("objects/{}.json", id)
}

pub(crate) fn members_prefix(work: &EntityId) -> String {
    format!("members/{}/", work)
}

pub(crate) fn member_key(work: &EntityId, position: usize) -> String {
    format!("{}{:08}", members_prefix(work), position)
}
