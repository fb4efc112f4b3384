//! In-process search index with commit semantics

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SearchDocument, SearchIndex};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<String, SearchDocument>,
    committed: HashMap<String, SearchDocument>,
    commits: u64,
}

#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    inner: RwLock<Inner>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.pending.len()
    }

    pub async fn committed_count(&self) -> usize {
        self.inner.read().await.committed.len()
    }

    pub async fn commits(&self) -> u64 {
        self.inner.read().await.commits
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn add(&self, document: &SearchDocument) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .pending
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let pending = std::mem::take(&mut inner.pending);
        inner.committed.extend(pending);
        inner.commits += 1;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, StoreError> {
        Ok(self.inner.read().await.committed.get(id).cloned())
    }
}
