//! Deferred jobs
//!
//! With the `none` association method, content attachment and
//! characterization are handed to a background worker instead of running
//! inline. Jobs travel over a tokio channel and are processed in order by a
//! single `DeferredWorker`.

use std::sync::Arc;

use async_trait::async_trait;
use folio_common::checksum::{sha256_bytes, verify_sha256};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actor::AttachmentActor;
use crate::error::{IngestError, JobQueueError, Result};
use crate::gateway::PersistenceGateway;
use crate::graph::{AttachedContent, EntityId, EntityRecord, StoredFile};

/// Capacity of the job channel
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeferredJob {
    /// Store the file's bytes and record them on the unit
    IngestFile {
        target: EntityId,
        file_index: usize,
        file: StoredFile,
    },
    /// Measure stored content and record size and checksum
    Characterize {
        target: EntityId,
        file_index: usize,
        key: String,
        mime_type: String,
    },
}

impl DeferredJob {
    pub fn target(&self) -> &EntityId {
        match self {
            DeferredJob::IngestFile { target, .. } | DeferredJob::Characterize { target, .. } => target,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeferredJob::IngestFile { .. } => "ingest_file",
            DeferredJob::Characterize { .. } => "characterize",
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: DeferredJob) -> std::result::Result<(), JobQueueError>;
}

/// Sending half of an in-process job channel
#[derive(Clone)]
pub struct ChannelJobQueue {
    sender: mpsc::Sender<DeferredJob>,
}

impl ChannelJobQueue {
    pub fn new() -> (Self, mpsc::Receiver<DeferredJob>) {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<DeferredJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: DeferredJob) -> std::result::Result<(), JobQueueError> {
        debug!(job = job.name(), target = %job.target(), "Enqueueing deferred job");
        self.sender.send(job).await.map_err(|_| JobQueueError::Closed)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
}

/// Drains the job channel until every sender is dropped
pub struct DeferredWorker {
    receiver: mpsc::Receiver<DeferredJob>,
    gateway: Arc<PersistenceGateway>,
    actor: Arc<dyn AttachmentActor>,
}

impl DeferredWorker {
    pub fn new(
        receiver: mpsc::Receiver<DeferredJob>,
        gateway: Arc<PersistenceGateway>,
        actor: Arc<dyn AttachmentActor>,
    ) -> Self {
        Self {
            receiver,
            gateway,
            actor,
        }
    }

    pub fn spawn(self) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> WorkerStats {
        info!("Deferred worker started");
        let mut stats = WorkerStats::default();

        while let Some(job) = self.receiver.recv().await {
            let name = job.name();
            let target = job.target().clone();
            match self.handle(job).await {
                Ok(()) => {
                    stats.completed += 1;
                    debug!(job = name, %target, "Deferred job completed");
                },
                Err(e) => {
                    stats.failed += 1;
                    error!(job = name, %target, error = %e, "Deferred job failed");
                },
            }
        }

        info!(completed = stats.completed, failed = stats.failed, "Deferred worker finished");
        stats
    }

    async fn handle(&self, job: DeferredJob) -> Result<()> {
        match job {
            DeferredJob::IngestFile {
                target,
                file_index,
                file,
            } => {
                let content = self.actor.attach_content(&target, &file).await?;
                self.record(&target, file_index, content).await
            },
            DeferredJob::Characterize {
                target,
                file_index,
                key,
                mime_type,
            } => {
                let data = self
                    .gateway
                    .get_content(&key)
                    .await
                    .map_err(|source| IngestError::Persistence {
                        target: target.clone(),
                        source,
                    })?;
                if mime_type.parse::<mime::Mime>().is_err() {
                    warn!(%target, mime_type = %mime_type, "Stored content has an unparseable mime type");
                }
                let content = AttachedContent {
                    key,
                    size: data.len() as u64,
                    checksum: sha256_bytes(&data),
                };
                self.verify(&target, file_index, &data).await;
                self.record(&target, file_index, content).await
            },
        }
    }

    /// Compare stored bytes against the checksum recorded at attach time
    async fn verify(&self, target: &EntityId, file_index: usize, data: &[u8]) {
        let recorded = match self.gateway.get_entity(target).await {
            Ok(EntityRecord::FileUnit(unit)) => unit
                .files
                .get(file_index)
                .and_then(|f| f.checksum.clone()),
            _ => None,
        };
        if let Some(expected) = recorded {
            if let Err(e) = verify_sha256(data, &expected) {
                warn!(%target, error = %e, "Stored content changed since attachment");
            }
        }
    }

    /// Read-modify-write of the unit record with new content details
    async fn record(&self, target: &EntityId, file_index: usize, content: AttachedContent) -> Result<()> {
        let persistence = |source| IngestError::Persistence {
            target: target.clone(),
            source,
        };

        let mut unit = match self.gateway.get_entity(target).await.map_err(persistence)? {
            EntityRecord::FileUnit(unit) => unit,
            other => {
                return Err(IngestError::InvalidTarget(format!(
                    "{} is a {}, not a file unit",
                    target,
                    other.kind().as_str()
                )))
            },
        };

        if let Some(file) = unit.files.get_mut(file_index) {
            file.key = content.key;
            file.size = Some(content.size);
            file.checksum = Some(content.checksum);
        }

        let record = EntityRecord::FileUnit(unit);
        self.gateway.write_record(&record).await.map_err(persistence)?;
        self.gateway.commit_index().await.map_err(persistence)?;
        Ok(())
    }
}
