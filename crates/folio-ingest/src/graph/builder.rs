//! Graph construction from parsed descriptors
//!
//! Building is pure: nothing here touches storage. Remote catalog metadata is
//! fetched up front by `fetch_remote_metadata` so a failed lookup aborts the
//! run before any entity exists.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::{
    content_key, EntityId, EntityKind, FileUnit, IdMinter, Resource, ResourceGraph,
    ResourceState, StoredFile, Work,
};
use crate::bibdata::{BibliographicLookup, RemoteRecord};
use crate::descriptor::{Descriptor, FileReference, FileRole, VolumeRecord};
use crate::error::{IngestError, Result};
use crate::graph::Visibility;
use crate::ordering::OrderingNode;

/// Title given to the unit holding the structure-map source
pub const STRUCTURE_MAP_TITLE: &str = "METS XML";

/// Catalog records fetched before any entity is built
#[derive(Debug, Clone, Default)]
pub struct RemoteMetadata {
    pub work: Option<RemoteRecord>,
    /// One entry per volume, in descriptor order
    pub volumes: Vec<Option<RemoteRecord>>,
}

pub struct GraphBuilder {
    minter: Arc<dyn IdMinter>,
    default_visibility: Visibility,
}

impl GraphBuilder {
    pub fn new(minter: Arc<dyn IdMinter>) -> Self {
        Self {
            minter,
            default_visibility: Visibility::default(),
        }
    }

    /// Visibility for volumes whose descriptor names none
    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    /// Look up the work's catalog record, then every volume's, in order
    ///
    /// Volumes without an identifier yield `None`. The first failure aborts.
    #[instrument(skip_all)]
    pub async fn fetch_remote_metadata(
        &self,
        descriptor: &Descriptor,
        lookup: &dyn BibliographicLookup,
    ) -> Result<RemoteMetadata> {
        let work = match descriptor.source_metadata_identifier.as_deref() {
            Some(identifier) => Some(fetch_record(lookup, identifier).await?),
            None => None,
        };

        let mut volumes = Vec::with_capacity(descriptor.volumes.len());
        for volume in &descriptor.volumes {
            let record = match volume.source_metadata_identifier.as_deref() {
                Some(identifier) => Some(fetch_record(lookup, identifier).await?),
                None => None,
            };
            volumes.push(record);
        }
        Ok(RemoteMetadata { work, volumes })
    }

    /// Empty graph, holding a work if the descriptor has several volumes
    pub fn start(&self, descriptor: &Descriptor) -> ResourceGraph {
        self.start_with_remote(descriptor, None)
    }

    /// Like `start`, overlaying the work's catalog title when one was fetched
    pub fn start_with_remote(&self, descriptor: &Descriptor, remote: Option<&RemoteRecord>) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        if descriptor.is_multi_volume() {
            let title = match remote {
                Some(record) if !record.title.is_empty() => record.title.clone(),
                _ => descriptor.title.clone(),
            };
            let work = Work {
                id: self.minter.mint(EntityKind::Work),
                title,
                visibility: descriptor.visibility.unwrap_or(self.default_visibility),
                viewing_direction: descriptor.viewing_direction,
                ordered_member_ids: Vec::new(),
                member_of_collections: descriptor.collections.clone(),
                replaces: descriptor.replaces.clone(),
            };
            info!(work = %work.id, volumes = descriptor.volumes.len(), "Grouping volumes under a work");
            graph.set_work(work);
        }
        graph
    }

    /// Build one volume's resource and file units into the graph
    ///
    /// Everything is validated before the graph is touched; on error the
    /// graph is unchanged.
    #[instrument(skip_all, fields(volume = %volume.title.join(" / ")))]
    pub fn build_volume(
        &self,
        graph: &mut ResourceGraph,
        descriptor: &Descriptor,
        volume: &VolumeRecord,
        remote: Option<&RemoteRecord>,
    ) -> Result<EntityId> {
        let resource_id = self.minter.mint(EntityKind::Resource);
        let structure = volume.structure.clone().unwrap_or_default();

        // Mint a unit per file; OCR text attached to a page joins that page's unit.
        let mut by_reference: HashMap<&str, EntityId> = HashMap::new();
        let mut units: Vec<FileUnit> = Vec::new();
        let mut member_ids = Vec::new();
        let mut related_object_ids = Vec::new();

        for file in volume.files.iter().filter(|f| f.attach_to.is_none()) {
            let id = self.minter.mint(EntityKind::FileUnit);
            let title = match file.role {
                FileRole::StructureMapSource => vec![STRUCTURE_MAP_TITLE.to_string()],
                _ => vec![unit_title(file, &structure)],
            };
            units.push(FileUnit {
                id: id.clone(),
                title,
                role: file.role,
                files: vec![stored_file(&id, file)],
                replaces: file.replaces.clone(),
            });

            match file.role {
                FileRole::StructureMapSource => related_object_ids.push(id.clone()),
                _ => member_ids.push(id.clone()),
            }
            by_reference.insert(file.id.as_str(), id);
        }

        for file in volume.files.iter() {
            let Some(target) = file.attach_to.as_deref() else {
                continue;
            };
            let unit_id = by_reference.get(target).cloned().ok_or_else(|| {
                IngestError::MalformedDescriptor(format!(
                    "file '{}' attaches to unknown file '{}'",
                    file.id, target
                ))
            })?;
            if let Some(unit) = units.iter_mut().find(|u| u.id == unit_id) {
                unit.files.push(stored_file(&unit_id, file));
            }
            by_reference.insert(file.id.as_str(), unit_id);
        }

        let logical_order = structure.try_map_proxies(|node: &OrderingNode, reference: &str| {
            by_reference
                .get(reference)
                .map(|id| id.as_str().to_string())
                .ok_or_else(|| IngestError::DanglingOrderingReference {
                    label: node.label.clone(),
                    reference: reference.to_string(),
                })
        })?;

        let mut title = volume.title.clone();
        let mut descriptive = Default::default();
        if let Some(record) = remote {
            if !record.title.is_empty() {
                title = record.title.clone();
            }
            descriptive = record.attributes.clone();
        }

        let replaces = volume
            .replaces
            .clone()
            .or_else(|| (!descriptor.is_multi_volume()).then(|| descriptor.replaces.clone()).flatten());

        let resource = Resource {
            id: resource_id.clone(),
            title,
            state: Some(ResourceState::Pending),
            visibility: volume
                .visibility
                .or(descriptor.visibility)
                .unwrap_or(self.default_visibility),
            viewing_direction: volume.viewing_direction,
            thumbnail_id: member_ids.first().cloned(),
            member_ids,
            logical_order,
            related_object_ids,
            replaces,
            source_metadata_identifier: volume.source_metadata_identifier.clone(),
            descriptive,
            member_of_collections: descriptor.collections.clone(),
            ordered_by: graph.work().map(|w| vec![w.id.clone()]).unwrap_or_default(),
        };

        debug!(
            resource = %resource_id,
            units = units.len(),
            depth = resource.logical_order.depth(),
            "Built resource"
        );

        for unit in units {
            graph.add_unit(unit);
        }
        graph.add_resource(resource);
        if graph.work().is_some() {
            graph.plan_member(resource_id.clone());
        }

        Ok(resource_id)
    }
}

async fn fetch_record(lookup: &dyn BibliographicLookup, identifier: &str) -> Result<RemoteRecord> {
    let record = lookup
        .fetch(identifier)
        .await
        .map_err(|source| IngestError::RemoteMetadata {
            identifier: identifier.to_string(),
            source,
        })?;
    debug!(identifier, title = ?record.title, "Fetched remote metadata");
    Ok(record)
}

/// Label of the unit's leaf in the structure tree, else the file's own title,
/// else its file name
fn unit_title(file: &FileReference, structure: &OrderingNode) -> String {
    structure
        .label_for(&file.id)
        .map(str::to_string)
        .or_else(|| file.title.clone())
        .unwrap_or_else(|| file.file_name())
}

fn stored_file(unit: &EntityId, file: &FileReference) -> StoredFile {
    let original_name = file.file_name();
    StoredFile {
        source: file.source.clone(),
        key: content_key(unit, &original_name),
        original_name,
        mime_type: file.mime_type.clone(),
        size: None,
        checksum: None,
    }
}
