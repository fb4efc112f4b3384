//! Association strategies
//!
//! A strategy decides when the attachment actor runs relative to graph
//! construction. The orchestrator calls the same three hooks for every
//! method; only what happens inside them differs:
//!
//! - `individual`: each resource and its units are attached and persisted as
//!   soon as the resource is built
//! - `batch`: metadata is written once for the whole graph, then content is
//!   attached unit by unit
//! - `none`: units are persisted and their content work is handed to the job
//!   queue; work membership is read back from the store

pub mod batch;
pub mod deferred;
pub mod individual;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::actor::{AttachmentActor, MetadataOptions};
use crate::counter::IngestCounter;
use crate::error::{IngestError, Result};
use crate::gateway::PersistenceGateway;
use crate::graph::{AttachedContent, EntityId, ResourceGraph, StoredFile};
use crate::jobs::JobQueue;

pub use batch::BatchStrategy;
pub use deferred::DeferredStrategy;
pub use individual::IndividualStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationMethod {
    #[default]
    Individual,
    Batch,
    None,
}

impl AssociationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationMethod::Individual => "individual",
            AssociationMethod::Batch => "batch",
            AssociationMethod::None => "none",
        }
    }

    pub fn strategy(&self) -> Box<dyn AssociationStrategy> {
        match self {
            AssociationMethod::Individual => Box::new(IndividualStrategy),
            AssociationMethod::Batch => Box::new(BatchStrategy),
            AssociationMethod::None => Box::new(DeferredStrategy),
        }
    }
}

impl fmt::Display for AssociationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(AssociationMethod::Individual),
            "batch" => Ok(AssociationMethod::Batch),
            "none" | "deferred" => Ok(AssociationMethod::None),
            other => Err(format!(
                "unknown association method '{}' (expected individual, batch or none)",
                other
            )),
        }
    }
}

/// Everything a strategy may touch during one run
#[derive(Clone)]
pub struct IngestContext {
    pub gateway: Arc<PersistenceGateway>,
    pub actor: Arc<dyn AttachmentActor>,
    pub jobs: Option<Arc<dyn JobQueue>>,
    pub counter: Arc<IngestCounter>,
    /// Upper bound on sibling content attachments in flight
    pub concurrency: usize,
    pub metadata_options: MetadataOptions,
}

#[async_trait]
pub trait AssociationStrategy: Send + Sync {
    fn method(&self) -> AssociationMethod;

    /// Called right after a volume's resource and units are in the graph
    async fn resource_built(
        &self,
        _ctx: &IngestContext,
        _graph: &mut ResourceGraph,
        _resource: &EntityId,
    ) -> Result<()> {
        Ok(())
    }

    /// Populate the work's member sequence once every resource exists
    async fn link_work_members(&self, _ctx: &IngestContext, graph: &mut ResourceGraph) -> Result<()> {
        graph.append_planned_members();
        Ok(())
    }

    /// Called once the whole graph is built and members are linked
    async fn graph_built(&self, _ctx: &IngestContext, _graph: &mut ResourceGraph) -> Result<()> {
        Ok(())
    }
}

/// Attach content for every file of the given units
///
/// Sibling files are stored concurrently; the graph is only updated after
/// all of them succeeded, one unit at a time.
pub(crate) async fn attach_units(
    ctx: &IngestContext,
    graph: &mut ResourceGraph,
    units: &[EntityId],
) -> Result<()> {
    let pending: Vec<(EntityId, usize, StoredFile)> = units
        .iter()
        .filter_map(|id| graph.unit(id))
        .flat_map(|unit| {
            unit.files
                .iter()
                .enumerate()
                .map(move |(index, file)| (unit.id.clone(), index, file.clone()))
        })
        .collect();

    let actor = &ctx.actor;
    let attached: Vec<(EntityId, usize, AttachedContent)> = stream::iter(pending)
        .map(|(id, index, file)| async move {
            let content = actor.attach_content(&id, &file).await?;
            Ok::<_, IngestError>((id, index, content))
        })
        .buffer_unordered(ctx.concurrency.max(1))
        .try_collect()
        .await?;

    for (id, index, content) in attached {
        graph.record_attachment(&id, index, content);
    }
    Ok(())
}

/// Every unit in the graph, resource by resource in page order
pub(crate) fn units_in_page_order(graph: &ResourceGraph) -> Vec<EntityId> {
    graph
        .resource_ids()
        .iter()
        .flat_map(|resource| graph.units_of(resource))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_support {
    use super::*;
    use crate::actor::StoreAttachmentActor;
    use crate::descriptor::parse_descriptor;
    use crate::gateway::RetryPolicy;
    use crate::graph::{GraphBuilder, SequentialMinter};
    use crate::index::MemorySearchIndex;
    use crate::store::MemoryObjectStore;

    pub struct Harness {
        pub store: Arc<MemoryObjectStore>,
        pub ctx: IngestContext,
        pub graph: ResourceGraph,
        pub resources: Vec<EntityId>,
        pub _dir: tempfile::TempDir,
    }

    /// Two-volume graph with two pages per volume, content on disk
    pub fn harness(jobs: Option<Arc<dyn JobQueue>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a1.tif", "a2.tif", "b1.tif", "b2.tif"] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        let yaml = r#"
title: Collected Letters
volumes:
  - title: Volume A
    files:
      - { path: a1.tif, mime_type: image/tiff }
      - { path: a2.tif, mime_type: image/tiff }
  - title: Volume B
    files:
      - { path: b1.tif, mime_type: image/tiff }
      - { path: b2.tif, mime_type: image/tiff }
"#;
        let descriptor = parse_descriptor(yaml, Some(dir.path())).unwrap();
        let builder = GraphBuilder::new(Arc::new(SequentialMinter::new()));
        let mut graph = builder.start(&descriptor);
        let resources = descriptor
            .volumes
            .iter()
            .map(|v| builder.build_volume(&mut graph, &descriptor, v, None).unwrap())
            .collect();

        let store = Arc::new(MemoryObjectStore::new());
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            Arc::new(MemorySearchIndex::new()),
            RetryPolicy::none(),
        ));
        let ctx = IngestContext {
            actor: Arc::new(StoreAttachmentActor::new(gateway.clone()).unwrap()),
            gateway,
            jobs,
            counter: IngestCounter::new(),
            concurrency: 2,
            metadata_options: MetadataOptions::default(),
        };

        Harness {
            store,
            ctx,
            graph,
            resources,
            _dir: dir,
        }
    }
}
