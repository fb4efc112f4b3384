//! Entity graph
//!
//! Works contain ordered resources; resources contain ordered file units plus
//! related objects (the structure-map source). Entities live in a flat arena
//! keyed by `EntityId`; references between them are identifiers, never
//! pointers, so the graph can be rekeyed once persistence confirms durable ids.

pub mod builder;
pub mod ids;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::{ContentSource, FileRole};
use crate::ordering::OrderingNode;

pub use builder::{GraphBuilder, RemoteMetadata};
pub use ids::{IdMinter, SequentialMinter, UuidMinter};

/// Opaque, unique entity identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Work,
    Resource,
    FileUnit,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Work => "work",
            EntityKind::Resource => "resource",
            EntityKind::FileUnit => "file_unit",
        }
    }
}

/// Lifecycle marker on resources; `Complete` only after a successful ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Complete,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Pending => "pending",
            ResourceState::Complete => "complete",
        }
    }
}

/// Access rights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Open,
    Authenticated,
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Open => "open",
            Visibility::Authenticated => "authenticated",
            Visibility::Restricted => "restricted",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "public" => Ok(Visibility::Open),
            "authenticated" | "campus" | "reading_room" | "reading-room" => {
                Ok(Visibility::Authenticated)
            },
            "restricted" | "private" => Ok(Visibility::Restricted),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

/// Page reading direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewingDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl ViewingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewingDirection::LeftToRight => "left-to-right",
            ViewingDirection::RightToLeft => "right-to-left",
        }
    }
}

impl FromStr for ViewingDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "left-to-right" | "ltr" => Ok(ViewingDirection::LeftToRight),
            "right-to-left" | "rtl" => Ok(ViewingDirection::RightToLeft),
            other => Err(format!("unknown viewing direction '{}'", other)),
        }
    }
}

/// Collection a resource is filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub slug: String,
    pub title: Vec<String>,
}

/// Result of storing one file's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedContent {
    pub key: String,
    pub size: u64,
    pub checksum: String,
}

/// One stored file inside a file unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub source: ContentSource,
    pub original_name: String,
    pub mime_type: String,
    /// Content-store key; fixed at build time so re-attachment overwrites
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl StoredFile {
    pub fn is_characterized(&self) -> bool {
        self.size.is_some() && self.checksum.is_some()
    }
}

/// Content key for a file inside a unit
pub fn content_key(unit: &EntityId, file_name: &str) -> String {
    format!("content/{}/{}", unit, file_name)
}

/// Smallest addressable content-bearing entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUnit {
    pub id: EntityId,
    pub title: Vec<String>,
    pub role: FileRole,
    pub files: Vec<StoredFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

/// One digitized volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: EntityId,
    pub title: Vec<String>,
    #[serde(default)]
    pub state: Option<ResourceState>,
    pub visibility: Visibility,
    pub viewing_direction: ViewingDirection,
    /// File units in page order; duplicates are meaningful
    pub member_ids: Vec<EntityId>,
    #[serde(default)]
    pub logical_order: OrderingNode,
    #[serde(default)]
    pub thumbnail_id: Option<EntityId>,
    #[serde(default)]
    pub related_object_ids: Vec<EntityId>,
    #[serde(default)]
    pub replaces: Option<String>,
    #[serde(default)]
    pub source_metadata_identifier: Option<String>,
    /// Attributes imported from the bibliographic record
    #[serde(default)]
    pub descriptive: BTreeMap<String, String>,
    #[serde(default)]
    pub member_of_collections: Vec<CollectionRef>,
    /// Parents listing this resource as a member
    #[serde(default)]
    pub ordered_by: Vec<EntityId>,
}

/// Multi-volume grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: EntityId,
    pub title: Vec<String>,
    pub visibility: Visibility,
    pub viewing_direction: ViewingDirection,
    /// Resources in order; duplicates are meaningful
    pub ordered_member_ids: Vec<EntityId>,
    #[serde(default)]
    pub member_of_collections: Vec<CollectionRef>,
    #[serde(default)]
    pub replaces: Option<String>,
}

/// Persisted form of any entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    Work(Work),
    Resource(Resource),
    FileUnit(FileUnit),
}

impl EntityRecord {
    pub fn id(&self) -> &EntityId {
        match self {
            EntityRecord::Work(w) => &w.id,
            EntityRecord::Resource(r) => &r.id,
            EntityRecord::FileUnit(u) => &u.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Work(_) => EntityKind::Work,
            EntityRecord::Resource(_) => EntityKind::Resource,
            EntityRecord::FileUnit(_) => EntityKind::FileUnit,
        }
    }

    pub fn title(&self) -> &[String] {
        match self {
            EntityRecord::Work(w) => &w.title,
            EntityRecord::Resource(r) => &r.title,
            EntityRecord::FileUnit(u) => &u.title,
        }
    }
}

/// In-memory graph for one ingest run
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    work: Option<Work>,
    resources: Vec<Resource>,
    units: Vec<FileUnit>,
    member_plan: Vec<EntityId>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_work(&mut self, work: Work) {
        self.work = Some(work);
    }

    pub fn work(&self) -> Option<&Work> {
        self.work.as_ref()
    }

    pub fn work_mut(&mut self) -> Option<&mut Work> {
        self.work.as_mut()
    }

    pub fn add_resource(&mut self, resource: Resource) -> EntityId {
        let id = resource.id.clone();
        self.resources.push(resource);
        id
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource_ids(&self) -> Vec<EntityId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }

    pub fn resource(&self, id: &EntityId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn resource_mut(&mut self, id: &EntityId) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| &r.id == id)
    }

    pub fn add_unit(&mut self, unit: FileUnit) -> EntityId {
        let id = unit.id.clone();
        self.units.push(unit);
        id
    }

    pub fn units(&self) -> &[FileUnit] {
        &self.units
    }

    pub fn unit(&self, id: &EntityId) -> Option<&FileUnit> {
        self.units.iter().find(|u| &u.id == id)
    }

    pub fn unit_mut(&mut self, id: &EntityId) -> Option<&mut FileUnit> {
        self.units.iter_mut().find(|u| &u.id == id)
    }

    pub fn file_unit_count(&self) -> usize {
        self.units.len()
    }

    /// Units belonging to a resource: members in page order, then related
    /// objects. Each unit appears once even if listed more than once.
    pub fn units_of(&self, resource: &EntityId) -> Vec<EntityId> {
        let Some(resource) = self.resource(resource) else {
            return Vec::new();
        };
        let mut out: Vec<EntityId> = Vec::new();
        for id in resource.member_ids.iter().chain(&resource.related_object_ids) {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }

    /// Record that a resource belongs in the work at the next position
    pub fn plan_member(&mut self, resource: EntityId) {
        self.member_plan.push(resource);
    }

    pub fn member_plan(&self) -> &[EntityId] {
        &self.member_plan
    }

    /// Copy the planned membership onto the work, in order
    pub fn append_planned_members(&mut self) {
        if let Some(work) = self.work.as_mut() {
            work.ordered_member_ids.extend(self.member_plan.iter().cloned());
        }
    }

    pub fn set_work_members(&mut self, members: Vec<EntityId>) {
        if let Some(work) = self.work.as_mut() {
            work.ordered_member_ids = members;
        }
    }

    pub fn record_attachment(&mut self, unit: &EntityId, file_index: usize, content: AttachedContent) {
        if let Some(file) = self.unit_mut(unit).and_then(|u| u.files.get_mut(file_index)) {
            file.key = content.key;
            file.size = Some(content.size);
            file.checksum = Some(content.checksum);
        }
    }

    /// Mark every resource complete
    pub fn mark_complete(&mut self) {
        for resource in &mut self.resources {
            resource.state = Some(ResourceState::Complete);
        }
    }

    pub fn kind_of(&self, id: &EntityId) -> Option<EntityKind> {
        if self.work.as_ref().is_some_and(|w| &w.id == id) {
            Some(EntityKind::Work)
        } else if self.resource(id).is_some() {
            Some(EntityKind::Resource)
        } else if self.unit(id).is_some() {
            Some(EntityKind::FileUnit)
        } else {
            None
        }
    }

    /// Snapshot of an entity in persisted form
    pub fn record(&self, id: &EntityId) -> Option<EntityRecord> {
        match self.kind_of(id)? {
            EntityKind::Work => self.work.clone().map(EntityRecord::Work),
            EntityKind::Resource => self.resource(id).cloned().map(EntityRecord::Resource),
            EntityKind::FileUnit => self.unit(id).cloned().map(EntityRecord::FileUnit),
        }
    }

    /// Replace a provisional id with the durable one and rewrite every
    /// reference to it. Returns false if no entity had the old id.
    pub fn rekey(&mut self, old: &EntityId, new: &EntityId) -> bool {
        if old == new {
            return true;
        }
        let Some(kind) = self.kind_of(old) else {
            return false;
        };

        match kind {
            EntityKind::Work => {
                if let Some(work) = self.work.as_mut() {
                    work.id = new.clone();
                }
            },
            EntityKind::Resource => {
                if let Some(resource) = self.resource_mut(old) {
                    resource.id = new.clone();
                }
            },
            EntityKind::FileUnit => {
                if let Some(unit) = self.unit_mut(old) {
                    unit.id = new.clone();
                }
            },
        }

        let swap = |ids: &mut Vec<EntityId>| {
            for id in ids.iter_mut() {
                if *id == *old {
                    *id = new.clone();
                }
            }
        };

        for resource in &mut self.resources {
            swap(&mut resource.member_ids);
            swap(&mut resource.related_object_ids);
            swap(&mut resource.ordered_by);
            if resource.thumbnail_id.as_ref() == Some(old) {
                resource.thumbnail_id = Some(new.clone());
            }
            resource.logical_order.rewrite_proxy(old.as_str(), new.as_str());
        }
        if let Some(work) = self.work.as_mut() {
            swap(&mut work.ordered_member_ids);
        }
        swap(&mut self.member_plan);

        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit(id: &str) -> FileUnit {
        FileUnit {
            id: EntityId::from(id),
            title: vec![id.to_string()],
            role: FileRole::Content,
            files: vec![StoredFile {
                source: ContentSource::Path(PathBuf::from(format!("/tmp/{}.tif", id))),
                original_name: format!("{}.tif", id),
                mime_type: "image/tiff".to_string(),
                key: content_key(&EntityId::from(id), &format!("{}.tif", id)),
                size: None,
                checksum: None,
            }],
            replaces: None,
        }
    }

    fn resource(id: &str, members: &[&str]) -> Resource {
        Resource {
            id: EntityId::from(id),
            title: vec!["Title".to_string()],
            state: Some(ResourceState::Pending),
            visibility: Visibility::Open,
            viewing_direction: ViewingDirection::LeftToRight,
            member_ids: members.iter().map(|m| EntityId::from(*m)).collect(),
            logical_order: OrderingNode::root(
                members.iter().map(|m| OrderingNode::leaf("p", *m)).collect(),
            ),
            thumbnail_id: members.first().map(|m| EntityId::from(*m)),
            related_object_ids: Vec::new(),
            replaces: None,
            source_metadata_identifier: None,
            descriptive: BTreeMap::new(),
            member_of_collections: Vec::new(),
            ordered_by: Vec::new(),
        }
    }

    #[test]
    fn test_rekey_rewrites_references() {
        let mut graph = ResourceGraph::new();
        graph.add_unit(unit("u1"));
        graph.add_unit(unit("u2"));
        graph.add_resource(resource("r1", &["u1", "u2", "u1"]));

        assert!(graph.rekey(&"u1".into(), &"durable-1".into()));

        let r = graph.resource(&"r1".into()).unwrap();
        assert_eq!(
            r.member_ids,
            vec![EntityId::from("durable-1"), "u2".into(), "durable-1".into()]
        );
        assert_eq!(r.thumbnail_id, Some("durable-1".into()));
        assert_eq!(r.logical_order.proxies(), vec!["durable-1", "u2", "durable-1"]);
        assert!(graph.unit(&"durable-1".into()).is_some());
        assert!(graph.unit(&"u1".into()).is_none());

        assert!(!graph.rekey(&"missing".into(), &"x".into()));
    }

    #[test]
    fn test_units_of_lists_each_unit_once() {
        let mut graph = ResourceGraph::new();
        let mut r = resource("r1", &["u1", "u2", "u1"]);
        r.related_object_ids.push("mets".into());
        graph.add_resource(r);

        assert_eq!(
            graph.units_of(&"r1".into()),
            vec![EntityId::from("u1"), "u2".into(), "mets".into()]
        );
    }

    #[test]
    fn test_planned_members_keep_duplicates() {
        let mut graph = ResourceGraph::new();
        graph.set_work(Work {
            id: "w1".into(),
            title: vec!["Work".to_string()],
            visibility: Visibility::Open,
            viewing_direction: ViewingDirection::LeftToRight,
            ordered_member_ids: Vec::new(),
            member_of_collections: Vec::new(),
            replaces: None,
        });
        graph.plan_member("r1".into());
        graph.plan_member("r2".into());
        graph.plan_member("r1".into());
        graph.append_planned_members();

        assert_eq!(
            graph.work().unwrap().ordered_member_ids,
            vec![EntityId::from("r1"), "r2".into(), "r1".into()]
        );
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = EntityRecord::FileUnit(unit("u1"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "file_unit");
        assert_eq!(json["role"], "content");

        let back: EntityRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_mark_complete() {
        let mut graph = ResourceGraph::new();
        graph.add_resource(resource("r1", &[]));
        graph.mark_complete();
        assert_eq!(
            graph.resource(&"r1".into()).unwrap().state,
            Some(ResourceState::Complete)
        );
    }

    #[test]
    fn test_visibility_codes() {
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Open);
        assert_eq!("campus".parse::<Visibility>().unwrap(), Visibility::Authenticated);
        assert!("nobody".parse::<Visibility>().is_err());
        assert_eq!("RTL".parse::<ViewingDirection>().unwrap(), ViewingDirection::RightToLeft);
    }
}
