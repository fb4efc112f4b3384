//! Post-ingest curation of persisted entities
//!
//! Reordering members, alphabetizing a work, and refreshing a resource from
//! the remote catalog. Each operation reads the stored record, changes it in
//! memory and writes it back once; on any error nothing is written.

use tracing::{info, instrument};

use crate::bibdata::BibliographicLookup;
use crate::error::{IngestError, Result, StoreError};
use crate::gateway::PersistenceGateway;
use crate::graph::{EntityId, EntityRecord, Resource};

/// Replace `current` with `order`, which must have the same length
///
/// Identifiers are not checked for membership and may repeat.
pub fn apply_order(current: &mut Vec<EntityId>, order: Vec<EntityId>) -> Result<()> {
    if order.len() != current.len() {
        return Err(IngestError::OrderMismatch {
            expected: current.len(),
            actual: order.len(),
        });
    }
    *current = order;
    Ok(())
}

fn stored(id: &EntityId) -> impl Fn(StoreError) -> IngestError + '_ {
    move |source| match source {
        StoreError::NotFound(_) => IngestError::NotFound(id.to_string()),
        source => IngestError::Persistence {
            target: id.clone(),
            source,
        },
    }
}

async fn save(gateway: &PersistenceGateway, record: &EntityRecord) -> Result<()> {
    let id = record.id();
    gateway.write_record(record).await.map_err(stored(id))?;
    gateway.commit_index().await.map_err(stored(id))?;
    Ok(())
}

/// Reorder a resource's file units or a work's members
#[instrument(skip(gateway, order), fields(members = order.len()))]
pub async fn save_order(
    gateway: &PersistenceGateway,
    id: &EntityId,
    order: Vec<EntityId>,
) -> Result<EntityRecord> {
    let mut record = gateway.get_entity(id).await.map_err(stored(id))?;

    match &mut record {
        EntityRecord::Work(work) => apply_order(&mut work.ordered_member_ids, order)?,
        EntityRecord::Resource(resource) => apply_order(&mut resource.member_ids, order)?,
        EntityRecord::FileUnit(_) => {
            return Err(IngestError::InvalidTarget(format!(
                "{} is a file unit and has no members",
                id
            )))
        },
    }

    save(gateway, &record).await?;
    info!(%id, "Saved member order");
    Ok(record)
}

/// Sort a work's members by their first title, case-insensitively
///
/// The sort is stable and repeated members stay repeated.
#[instrument(skip(gateway))]
pub async fn alphabetize_members(gateway: &PersistenceGateway, id: &EntityId) -> Result<EntityRecord> {
    let record = gateway.get_entity(id).await.map_err(stored(id))?;
    let EntityRecord::Work(mut work) = record else {
        return Err(IngestError::InvalidTarget(format!("{} is not a work", id)));
    };

    let mut keyed = Vec::with_capacity(work.ordered_member_ids.len());
    for member in work.ordered_member_ids.drain(..) {
        let member_record = gateway.get_entity(&member).await.map_err(stored(&member))?;
        let key = member_record
            .title()
            .first()
            .map(|t| t.to_lowercase())
            .unwrap_or_default();
        keyed.push((key, member));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    work.ordered_member_ids = keyed.into_iter().map(|(_, member)| member).collect();

    let record = EntityRecord::Work(work);
    save(gateway, &record).await?;
    info!(%id, "Alphabetized members");
    Ok(record)
}

/// Fetch the resource's catalog record again and overlay it
#[instrument(skip(gateway, lookup))]
pub async fn refresh_remote_metadata(
    gateway: &PersistenceGateway,
    lookup: &dyn BibliographicLookup,
    id: &EntityId,
) -> Result<Resource> {
    let record = gateway.get_entity(id).await.map_err(stored(id))?;
    let EntityRecord::Resource(mut resource) = record else {
        return Err(IngestError::InvalidTarget(format!("{} is not a resource", id)));
    };
    let Some(identifier) = resource.source_metadata_identifier.clone() else {
        return Err(IngestError::InvalidTarget(format!(
            "{} has no source metadata identifier",
            id
        )));
    };

    let remote = lookup
        .fetch(&identifier)
        .await
        .map_err(|source| IngestError::RemoteMetadata { identifier, source })?;

    if !remote.title.is_empty() {
        resource.title = remote.title;
    }
    resource.descriptive.extend(remote.attributes);

    save(gateway, &EntityRecord::Resource(resource.clone())).await?;
    info!(%id, "Refreshed remote metadata");
    Ok(resource)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bibdata::{RemoteRecord, StaticLookup};
    use crate::gateway::RetryPolicy;
    use crate::graph::{ViewingDirection, Visibility, Work};
    use crate::index::MemorySearchIndex;
    use crate::store::MemoryObjectStore;

    fn gateway() -> PersistenceGateway {
        PersistenceGateway::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemorySearchIndex::new()),
            RetryPolicy::none(),
        )
    }

    fn resource(id: &str, title: &str, members: &[&str]) -> Resource {
        Resource {
            id: id.into(),
            title: vec![title.to_string()],
            state: None,
            visibility: Visibility::Open,
            viewing_direction: ViewingDirection::LeftToRight,
            member_ids: members.iter().map(|m| EntityId::from(*m)).collect(),
            logical_order: Default::default(),
            thumbnail_id: None,
            related_object_ids: Vec::new(),
            replaces: None,
            source_metadata_identifier: None,
            descriptive: Default::default(),
            member_of_collections: Vec::new(),
            ordered_by: Vec::new(),
        }
    }

    fn work(members: &[&str]) -> EntityRecord {
        EntityRecord::Work(Work {
            id: "w1".into(),
            title: vec!["Letters".to_string()],
            visibility: Visibility::Open,
            viewing_direction: ViewingDirection::LeftToRight,
            ordered_member_ids: members.iter().map(|m| EntityId::from(*m)).collect(),
            member_of_collections: Vec::new(),
            replaces: None,
        })
    }

    fn ids(values: &[&str]) -> Vec<EntityId> {
        values.iter().map(|v| EntityId::from(*v)).collect()
    }

    #[test]
    fn test_apply_order_length_check() {
        let mut current = ids(&["a", "b"]);
        let err = apply_order(&mut current, ids(&["b"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Order given has the wrong number of elements (should be 2)"
        );
        assert_eq!(current, ids(&["a", "b"]));

        apply_order(&mut current, ids(&["b", "b"])).unwrap();
        assert_eq!(current, ids(&["b", "b"]));
    }

    #[tokio::test]
    async fn test_save_order_persists_and_rejects_mismatch() {
        let gateway = gateway();
        let id = EntityId::from("r1");
        gateway
            .write_record(&EntityRecord::Resource(resource("r1", "Vol", &["u1", "u2", "u3"])))
            .await
            .unwrap();

        save_order(&gateway, &id, ids(&["u3", "u1", "u2"])).await.unwrap();
        let EntityRecord::Resource(reloaded) = gateway.get_entity(&id).await.unwrap() else {
            panic!("expected a resource");
        };
        assert_eq!(reloaded.member_ids, ids(&["u3", "u1", "u2"]));

        let err = save_order(&gateway, &id, ids(&["u1"])).await.unwrap_err();
        assert!(matches!(err, IngestError::OrderMismatch { expected: 3, actual: 1 }));
        let EntityRecord::Resource(unchanged) = gateway.get_entity(&id).await.unwrap() else {
            panic!("expected a resource");
        };
        assert_eq!(unchanged.member_ids, ids(&["u3", "u1", "u2"]));
    }

    #[tokio::test]
    async fn test_save_order_unknown_id() {
        let err = save_order(&gateway(), &"nope".into(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_alphabetize_keeps_duplicates() {
        let gateway = gateway();
        for (id, title) in [("r1", "zebra"), ("r2", "Apple"), ("r3", "mango")] {
            gateway
                .write_record(&EntityRecord::Resource(resource(id, title, &[])))
                .await
                .unwrap();
        }
        gateway.write_record(&work(&["r1", "r2", "r3", "r2"])).await.unwrap();

        let EntityRecord::Work(sorted) = alphabetize_members(&gateway, &"w1".into()).await.unwrap() else {
            panic!("expected a work");
        };
        assert_eq!(sorted.ordered_member_ids, ids(&["r2", "r2", "r3", "r1"]));
    }

    #[tokio::test]
    async fn test_refresh_remote_metadata() {
        let gateway = gateway();
        let mut stored = resource("r1", "Old Title", &[]);
        stored.source_metadata_identifier = Some("4609321".to_string());
        gateway.write_record(&EntityRecord::Resource(stored)).await.unwrap();

        let lookup = StaticLookup::new()
            .with_record(RemoteRecord::new("4609321", "Fontane di Roma").with_attribute("creator", "Respighi"));
        let refreshed = refresh_remote_metadata(&gateway, &lookup, &"r1".into()).await.unwrap();
        assert_eq!(refreshed.title, vec!["Fontane di Roma"]);
        assert_eq!(refreshed.descriptive.get("creator").map(String::as_str), Some("Respighi"));

        let err = refresh_remote_metadata(&gateway, &StaticLookup::new(), &"r1".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error retrieving metadata for '4609321'");
    }
}
