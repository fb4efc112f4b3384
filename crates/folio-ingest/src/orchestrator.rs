//! Ingest pipeline orchestrator
//!
//! Drives one run: parse, look up remote metadata, build each volume, hand
//! the graph to the association strategy, then mark resources complete and
//! commit the search index. Any error aborts the run; whatever was already
//! written stays in the store and the error names the offending identifier.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::actor::{AttachmentActor, MetadataOptions, StoreAttachmentActor};
use crate::bibdata::{BibliographicLookup, StaticLookup};
use crate::counter::IngestCounter;
use crate::descriptor::{load_descriptor, Descriptor};
use crate::error::{IngestError, Result};
use crate::gateway::PersistenceGateway;
use crate::graph::{EntityId, GraphBuilder, IdMinter, ResourceGraph, UuidMinter, Visibility};
use crate::jobs::JobQueue;
use crate::strategy::{AssociationMethod, IngestContext};

/// Default number of sibling files attached concurrently
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub method: AssociationMethod,
    pub work_id: Option<EntityId>,
    pub resource_ids: Vec<EntityId>,
    pub file_units: usize,
    /// Counter value at the end of the run
    pub ingested: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

pub struct IngestPipeline {
    gateway: Arc<PersistenceGateway>,
    method: AssociationMethod,
    actor: Arc<dyn AttachmentActor>,
    lookup: Arc<dyn BibliographicLookup>,
    jobs: Option<Arc<dyn JobQueue>>,
    builder: GraphBuilder,
    concurrency: usize,
}

impl IngestPipeline {
    pub fn builder(gateway: Arc<PersistenceGateway>) -> IngestPipelineBuilder {
        IngestPipelineBuilder::new(gateway)
    }

    pub fn method(&self) -> AssociationMethod {
        self.method
    }

    /// Load a descriptor file and ingest it
    pub async fn ingest_path(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let descriptor = load_descriptor(path).await?;
        self.ingest(&descriptor).await
    }

    pub async fn ingest(&self, descriptor: &Descriptor) -> Result<IngestReport> {
        self.ingest_with_counter(descriptor, IngestCounter::new()).await
    }

    /// Ingest with a caller-owned counter, so progress can be polled while
    /// the run is in flight
    #[instrument(skip_all, fields(method = %self.method, volumes = descriptor.volumes.len()))]
    pub async fn ingest_with_counter(
        &self,
        descriptor: &Descriptor,
        counter: Arc<IngestCounter>,
    ) -> Result<IngestReport> {
        let started_at = Utc::now();
        info!(files = descriptor.file_count(), "Starting ingest");

        let result = self.run(descriptor, &counter).await;
        let graph = match result {
            Ok(graph) => graph,
            Err(e) => {
                error!(
                    error = %e,
                    identifier = e.offending_identifier().unwrap_or("-"),
                    ingested = counter.value(),
                    "Ingest failed"
                );
                return Err(e);
            },
        };

        let report = IngestReport {
            method: self.method,
            work_id: graph.work().map(|w| w.id.clone()),
            resource_ids: graph.resource_ids(),
            file_units: graph.file_unit_count(),
            ingested: counter.value(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            resources = report.resource_ids.len(),
            file_units = report.file_units,
            ingested = report.ingested,
            elapsed_ms = report.elapsed_ms(),
            "Ingest complete"
        );
        Ok(report)
    }

    async fn run(&self, descriptor: &Descriptor, counter: &Arc<IngestCounter>) -> Result<ResourceGraph> {
        let strategy = self.method.strategy();
        let ctx = IngestContext {
            gateway: self.gateway.clone(),
            actor: self.actor.clone(),
            jobs: self.jobs.clone(),
            counter: counter.clone(),
            concurrency: self.concurrency,
            metadata_options: MetadataOptions::default(),
        };

        // Before anything is written
        let remote = self
            .builder
            .fetch_remote_metadata(descriptor, self.lookup.as_ref())
            .await?;

        let mut graph = self.builder.start_with_remote(descriptor, remote.work.as_ref());
        for (volume, record) in descriptor.volumes.iter().zip(&remote.volumes) {
            let resource = self
                .builder
                .build_volume(&mut graph, descriptor, volume, record.as_ref())?;
            strategy.resource_built(&ctx, &mut graph, &resource).await?;
        }

        strategy.link_work_members(&ctx, &mut graph).await?;
        strategy.graph_built(&ctx, &mut graph).await?;

        self.finalize(&mut graph).await?;
        Ok(graph)
    }

    /// Mark resources complete, write them and the work, commit the index
    async fn finalize(&self, graph: &mut ResourceGraph) -> Result<()> {
        graph.mark_complete();

        let mut targets = graph.resource_ids();
        targets.extend(graph.work().map(|w| w.id.clone()));

        let mut last = None;
        for id in targets {
            let written = self
                .gateway
                .write_entity(graph, &id)
                .await
                .map_err(|source| IngestError::Persistence {
                    target: id.clone(),
                    source,
                })?;
            last = Some(written);
        }

        if let Some(anchor) = last {
            self.gateway
                .commit_index()
                .await
                .map_err(|source| IngestError::Persistence {
                    target: anchor,
                    source,
                })?;
        }
        Ok(())
    }
}

pub struct IngestPipelineBuilder {
    gateway: Arc<PersistenceGateway>,
    method: AssociationMethod,
    actor: Option<Arc<dyn AttachmentActor>>,
    lookup: Arc<dyn BibliographicLookup>,
    jobs: Option<Arc<dyn JobQueue>>,
    minter: Arc<dyn IdMinter>,
    concurrency: usize,
    default_visibility: Visibility,
}

impl IngestPipelineBuilder {
    fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self {
            gateway,
            method: AssociationMethod::default(),
            actor: None,
            lookup: Arc::new(StaticLookup::new()),
            jobs: None,
            minter: Arc::new(UuidMinter),
            concurrency: DEFAULT_CONCURRENCY,
            default_visibility: Visibility::default(),
        }
    }

    pub fn method(mut self, method: AssociationMethod) -> Self {
        self.method = method;
        self
    }

    /// Replace the default gateway-backed actor
    pub fn actor(mut self, actor: Arc<dyn AttachmentActor>) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn lookup(mut self, lookup: Arc<dyn BibliographicLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Required for `AssociationMethod::None`
    pub fn jobs(mut self, jobs: Arc<dyn JobQueue>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn minter(mut self, minter: Arc<dyn IdMinter>) -> Self {
        self.minter = minter;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    /// Fails only when the default actor's HTTP client cannot be built
    pub fn build(self) -> Result<IngestPipeline> {
        let actor = match self.actor {
            Some(actor) => actor,
            None => Arc::new(StoreAttachmentActor::new(self.gateway.clone())?),
        };

        Ok(IngestPipeline {
            builder: GraphBuilder::new(self.minter).with_default_visibility(self.default_visibility),
            gateway: self.gateway,
            method: self.method,
            actor,
            lookup: self.lookup,
            jobs: self.jobs,
            concurrency: self.concurrency,
        })
    }
}
