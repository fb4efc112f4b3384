//! Build the whole graph, write its metadata once, then attach content

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{attach_units, AssociationMethod, AssociationStrategy, IngestContext};
use crate::error::{IngestError, Result};
use crate::graph::ResourceGraph;

pub struct BatchStrategy;

#[async_trait]
impl AssociationStrategy for BatchStrategy {
    fn method(&self) -> AssociationMethod {
        AssociationMethod::Batch
    }

    #[instrument(skip_all)]
    async fn graph_built(&self, ctx: &IngestContext, graph: &mut ResourceGraph) -> Result<()> {
        // One metadata pass over the whole graph
        ctx.actor
            .create_metadata(None, graph, &ctx.metadata_options)
            .await?;
        info!(
            resources = graph.resources().len(),
            units = graph.file_unit_count(),
            "Graph metadata written"
        );

        for resource in graph.resource_ids() {
            let units = graph.units_of(&resource);
            attach_units(ctx, graph, &units).await?;

            for unit in &units {
                ctx.gateway
                    .write_entity(graph, unit)
                    .await
                    .map_err(|source| IngestError::Persistence {
                        target: unit.clone(),
                        source,
                    })?;
                let ingested = ctx.counter.increment();
                debug!(%unit, ingested, "File unit ingested");
            }
        }
        Ok(())
    }
}
