//! Attach and persist each resource as soon as it is built

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{attach_units, AssociationMethod, AssociationStrategy, IngestContext};
use crate::error::Result;
use crate::graph::{EntityId, ResourceGraph};

pub struct IndividualStrategy;

#[async_trait]
impl AssociationStrategy for IndividualStrategy {
    fn method(&self) -> AssociationMethod {
        AssociationMethod::Individual
    }

    #[instrument(skip(self, ctx, graph))]
    async fn resource_built(
        &self,
        ctx: &IngestContext,
        graph: &mut ResourceGraph,
        resource: &EntityId,
    ) -> Result<()> {
        let units = graph.units_of(resource);
        attach_units(ctx, graph, &units).await?;

        for unit in &units {
            ctx.actor
                .create_metadata(Some(unit), graph, &ctx.metadata_options)
                .await?;
            let ingested = ctx.counter.increment();
            debug!(%unit, ingested, "File unit ingested");
        }

        ctx.actor
            .create_metadata(Some(resource), graph, &ctx.metadata_options)
            .await
    }
}
