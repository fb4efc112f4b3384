//! In-process object store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ObjectStore;
use crate::error::StoreError;
use crate::graph::{EntityId, EntityRecord};

#[derive(Debug, Default)]
struct Inner {
    /// Records are kept serialized so reads see exactly what was written
    entities: BTreeMap<EntityId, String>,
    content: HashMap<String, (Vec<u8>, String)>,
    members: BTreeMap<EntityId, BTreeMap<usize, EntityId>>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: RwLock<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mime type recorded for stored content
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .content
            .get(key)
            .map(|(_, mime)| mime.clone())
    }

    pub async fn content_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.content.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn records(&self) -> Result<Vec<EntityRecord>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .entities
            .values()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_entity(&self, record: &EntityRecord) -> Result<EntityId, StoreError> {
        let json = serde_json::to_string(record)?;
        self.inner
            .write()
            .await
            .entities
            .insert(record.id().clone(), json);
        Ok(record.id().clone())
    }

    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError> {
        let inner = self.inner.read().await;
        let json = inner
            .entities
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(json)?)
    }

    async fn put_content(&self, key: &str, data: &[u8], mime_type: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .content
            .insert(key.to_string(), (data.to_vec(), mime_type.to_string()));
        Ok(())
    }

    async fn get_content(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner
            .read()
            .await
            .content
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set_member(
        &self,
        work: &EntityId,
        position: usize,
        member: &EntityId,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .members
            .entry(work.clone())
            .or_default()
            .insert(position, member.clone());
        Ok(())
    }

    async fn member_ids(&self, work: &EntityId) -> Result<Vec<EntityId>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .members
            .get(work)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.entities.len())
    }
}
