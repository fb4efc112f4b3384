//! Persistence gateway
//!
//! Every write to the object store or search index goes through here, and
//! every one is retried on transient failure with the identical payload. The
//! gateway never touches the ingest counter: retries are invisible to
//! progress reporting.

pub mod retry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::graph::{EntityId, EntityRecord, ResourceGraph};
use crate::index::{SearchDocument, SearchIndex};
use crate::store::ObjectStore;

pub use retry::{Backoff, RetryPolicy};

pub struct PersistenceGateway {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn SearchIndex>,
    policy: RetryPolicy,
    attempts: AtomicU64,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ObjectStore>, index: Arc<dyn SearchIndex>, policy: RetryPolicy) -> Self {
        Self {
            store,
            index,
            policy,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Physical attempts made so far, retries included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn tally(&self) -> impl FnMut() + '_ {
        move || {
            self.attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[instrument(skip(self, record), fields(id = %record.id(), kind = record.kind().as_str()))]
    pub async fn put_entity(&self, record: &EntityRecord) -> Result<EntityId, StoreError> {
        self.policy
            .run("put entity", self.tally(), || self.store.put_entity(record))
            .await
    }

    pub async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError> {
        self.policy
            .run("get entity", self.tally(), || self.store.get_entity(id))
            .await
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn put_content(&self, key: &str, data: &[u8], mime_type: &str) -> Result<(), StoreError> {
        self.policy
            .run("put content", self.tally(), || {
                self.store.put_content(key, data, mime_type)
            })
            .await
    }

    pub async fn get_content(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.policy
            .run("get content", self.tally(), || self.store.get_content(key))
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_member(
        &self,
        work: &EntityId,
        position: usize,
        member: &EntityId,
    ) -> Result<(), StoreError> {
        self.policy
            .run("set member", self.tally(), || {
                self.store.set_member(work, position, member)
            })
            .await
    }

    pub async fn member_ids(&self, work: &EntityId) -> Result<Vec<EntityId>, StoreError> {
        self.policy
            .run("read members", self.tally(), || self.store.member_ids(work))
            .await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.policy
            .run("count entities", self.tally(), || self.store.count())
            .await
    }

    /// Add (or replace) the record's search document; visible after commit
    pub async fn index_record(&self, record: &EntityRecord) -> Result<(), StoreError> {
        let document = SearchDocument::from(record);
        self.policy
            .run("index add", self.tally(), || self.index.add(&document))
            .await
    }

    pub async fn commit_index(&self) -> Result<(), StoreError> {
        self.policy
            .run("index commit", self.tally(), || self.index.commit())
            .await?;
        debug!("Search index committed");
        Ok(())
    }

    pub async fn indexed(&self, id: &EntityId) -> Result<Option<SearchDocument>, StoreError> {
        self.policy
            .run("index get", self.tally(), || self.index.get(id.as_str()))
            .await
    }

    /// Store a record and index it
    pub async fn write_record(&self, record: &EntityRecord) -> Result<EntityId, StoreError> {
        let id = self.put_entity(record).await?;
        self.index_record(record).await?;
        Ok(id)
    }

    /// Store and index one entity from the graph
    ///
    /// If the store hands back a different durable id, the graph is rekeyed
    /// and the record rewritten under that id.
    pub async fn write_entity(
        &self,
        graph: &mut ResourceGraph,
        id: &EntityId,
    ) -> Result<EntityId, StoreError> {
        let record = graph
            .record(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let assigned = self.put_entity(&record).await?;
        if assigned == *id {
            self.index_record(&record).await?;
            return Ok(assigned);
        }

        info!(provisional = %id, durable = %assigned, "Store assigned a new identifier");
        graph.rekey(id, &assigned);
        let record = graph
            .record(&assigned)
            .ok_or_else(|| StoreError::NotFound(assigned.to_string()))?;
        self.write_record(&record).await
    }
}
