//! Shared harness for folio-ingest integration tests
//!
//! Everything runs in process: a `MemoryObjectStore`, a `MemorySearchIndex`
//! and, for deferred runs, a channel job queue drained by a real worker.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use folio_ingest::actor::{AttachmentActor, MetadataOptions, StoreAttachmentActor};
use folio_ingest::bibdata::BibliographicLookup;
use folio_ingest::error::{Result as IngestResult, StoreError};
use folio_ingest::gateway::{Backoff, PersistenceGateway, RetryPolicy};
use folio_ingest::graph::{AttachedContent, EntityRecord, SequentialMinter, StoredFile};
use folio_ingest::index::MemorySearchIndex;
use folio_ingest::jobs::{ChannelJobQueue, DeferredWorker, WorkerStats};
use folio_ingest::store::{MemoryObjectStore, ObjectStore};
use folio_ingest::{AssociationMethod, EntityId, IngestPipeline, IngestReport, ResourceGraph};

static TRACING: Once = Once::new();

/// Route pipeline logs through the test writer; set RUST_LOG to see them
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Short fixed backoff so retry tests stay fast
pub fn test_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Backoff::Fixed)
}

// ============================================================================
// Fault injection
// ============================================================================

/// Object store where every odd write to a given key fails transiently
///
/// Tracking per key keeps the pattern deterministic when writes interleave.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryObjectStore,
    calls: Mutex<HashMap<String, u64>>,
    writes: AtomicU64,
    failures: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    /// Write calls that succeeded
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn stutter(&self, operation: &str, key: String) -> Result<(), StoreError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key).or_default();
            *count += 1;
            *count
        };
        if call % 2 == 1 {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::transient(operation, "400 IncompleteBody"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put_entity(&self, record: &EntityRecord) -> Result<EntityId, StoreError> {
        self.stutter("put entity", format!("entity:{}", record.id()))?;
        self.inner.put_entity(record).await
    }

    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError> {
        self.inner.get_entity(id).await
    }

    async fn put_content(&self, key: &str, data: &[u8], mime_type: &str) -> Result<(), StoreError> {
        self.stutter("put content", format!("content:{}", key))?;
        self.inner.put_content(key, data, mime_type).await
    }

    async fn get_content(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get_content(key).await
    }

    async fn set_member(
        &self,
        work: &EntityId,
        position: usize,
        member: &EntityId,
    ) -> Result<(), StoreError> {
        self.stutter("set member", format!("member:{}:{}", work, position))?;
        self.inner.set_member(work, position, member).await
    }

    async fn member_ids(&self, work: &EntityId) -> Result<Vec<EntityId>, StoreError> {
        self.inner.member_ids(work).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

// ============================================================================
// Recording actor
// ============================================================================

/// Delegates to the store-backed actor and remembers every call
pub struct RecordingActor {
    inner: StoreAttachmentActor,
    metadata_targets: Mutex<Vec<Option<EntityId>>>,
    attached: AtomicU64,
}

impl RecordingActor {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self {
            inner: StoreAttachmentActor::new(gateway).unwrap(),
            metadata_targets: Mutex::new(Vec::new()),
            attached: AtomicU64::new(0),
        }
    }

    pub fn metadata_targets(&self) -> Vec<Option<EntityId>> {
        self.metadata_targets.lock().unwrap().clone()
    }

    pub fn attached(&self) -> u64 {
        self.attached.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentActor for RecordingActor {
    async fn attach_content(&self, target: &EntityId, file: &StoredFile) -> IngestResult<AttachedContent> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        self.inner.attach_content(target, file).await
    }

    async fn create_metadata(
        &self,
        target: Option<&EntityId>,
        graph: &mut ResourceGraph,
        options: &MetadataOptions,
    ) -> IngestResult<()> {
        self.metadata_targets.lock().unwrap().push(target.cloned());
        self.inner.create_metadata(target, graph, options).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryObjectStore>,
    pub index: Arc<MemorySearchIndex>,
    pub gateway: Arc<PersistenceGateway>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let gateway = Arc::new(PersistenceGateway::new(store.clone(), index.clone(), test_policy()));
        Self {
            store,
            index,
            gateway,
        }
    }

    pub async fn resource(&self, id: &EntityId) -> folio_ingest::graph::Resource {
        match self.store.get_entity(id).await.unwrap() {
            EntityRecord::Resource(resource) => resource,
            other => panic!("expected a resource, got {:?}", other.kind()),
        }
    }

    pub async fn work(&self, id: &EntityId) -> folio_ingest::graph::Work {
        match self.store.get_entity(id).await.unwrap() {
            EntityRecord::Work(work) => work,
            other => panic!("expected a work, got {:?}", other.kind()),
        }
    }

    pub async fn unit(&self, id: &EntityId) -> folio_ingest::graph::FileUnit {
        match self.store.get_entity(id).await.unwrap() {
            EntityRecord::FileUnit(unit) => unit,
            other => panic!("expected a file unit, got {:?}", other.kind()),
        }
    }
}

/// Result of `ingest_fixture`
pub struct Run {
    pub report: IngestResult<IngestReport>,
    pub worker: Option<WorkerStats>,
}

/// Ingest a fixture with the given method and optional lookup, draining the
/// deferred worker before returning
pub async fn ingest_fixture(
    gateway: Arc<PersistenceGateway>,
    method: AssociationMethod,
    fixture: &str,
    lookup: Option<Arc<dyn BibliographicLookup>>,
) -> Run {
    let mut builder = IngestPipeline::builder(gateway.clone())
        .method(method)
        .minter(Arc::new(SequentialMinter::new()));
    if let Some(lookup) = lookup {
        builder = builder.lookup(lookup);
    }

    let worker = if method == AssociationMethod::None {
        let (queue, receiver) = ChannelJobQueue::new();
        builder = builder.jobs(Arc::new(queue));
        let actor = Arc::new(StoreAttachmentActor::new(gateway.clone()).unwrap());
        Some(DeferredWorker::new(receiver, gateway, actor).spawn())
    } else {
        None
    };

    let pipeline = builder.build().unwrap();
    let report = pipeline.ingest_path(fixture_path(fixture)).await;
    drop(pipeline);

    let worker = match worker {
        Some(handle) => Some(handle.await.unwrap()),
        None => None,
    };
    Run { report, worker }
}
