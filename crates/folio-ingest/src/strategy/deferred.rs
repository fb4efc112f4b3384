//! Defer content work to the job queue
//!
//! Units are persisted without content and two jobs are scheduled per file:
//! ingest, then characterize. The run succeeds once scheduling succeeds.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{units_in_page_order, AssociationMethod, AssociationStrategy, IngestContext};
use crate::error::{IngestError, JobQueueError, Result};
use crate::graph::ResourceGraph;
use crate::jobs::DeferredJob;

pub struct DeferredStrategy;

#[async_trait]
impl AssociationStrategy for DeferredStrategy {
    fn method(&self) -> AssociationMethod {
        AssociationMethod::None
    }

    /// Write membership positionally, then take whatever the store holds
    #[instrument(skip_all)]
    async fn link_work_members(&self, ctx: &IngestContext, graph: &mut ResourceGraph) -> Result<()> {
        let Some(work) = graph.work().map(|w| w.id.clone()) else {
            return Ok(());
        };
        let persistence = |source| IngestError::Persistence {
            target: work.clone(),
            source,
        };

        for (position, member) in graph.member_plan().iter().enumerate() {
            ctx.gateway
                .set_member(&work, position, member)
                .await
                .map_err(persistence)?;
        }

        let members = ctx.gateway.member_ids(&work).await.map_err(persistence)?;
        debug!(%work, members = members.len(), "Read back work members");
        graph.set_work_members(members);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn graph_built(&self, ctx: &IngestContext, graph: &mut ResourceGraph) -> Result<()> {
        for unit in units_in_page_order(graph) {
            let unit = ctx
                .gateway
                .write_entity(graph, &unit)
                .await
                .map_err(|source| IngestError::Persistence {
                    target: unit.clone(),
                    source,
                })?;

            let scheduling = |source| IngestError::Scheduling {
                target: unit.clone(),
                source,
            };
            let queue = ctx.jobs.as_ref().ok_or(JobQueueError::Unavailable).map_err(scheduling)?;

            let files = graph.unit(&unit).map(|u| u.files.clone()).unwrap_or_default();
            for (file_index, file) in files.into_iter().enumerate() {
                let characterize = DeferredJob::Characterize {
                    target: unit.clone(),
                    file_index,
                    key: file.key.clone(),
                    mime_type: file.mime_type.clone(),
                };
                queue
                    .enqueue(DeferredJob::IngestFile {
                        target: unit.clone(),
                        file_index,
                        file,
                    })
                    .await
                    .map_err(scheduling)?;
                queue.enqueue(characterize).await.map_err(scheduling)?;
            }

            let ingested = ctx.counter.increment();
            debug!(%unit, ingested, "File unit scheduled");
        }

        info!(units = graph.file_unit_count(), "Deferred content work scheduled");
        Ok(())
    }
}
