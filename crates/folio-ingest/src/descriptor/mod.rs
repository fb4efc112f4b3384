//! Ingest descriptors
//!
//! A descriptor lists one or more volumes to ingest. Each volume carries its
//! title, access rights, reading direction, an optional catalog identifier for
//! remote metadata, its files in page order and an optional structure tree
//! whose leaves reference those files by id.
//!
//! Single-volume descriptors keep the volume fields at the top level:
//!
//! ```yaml
//! title: Fontane di Roma
//! visibility: open
//! viewing_direction: left-to-right
//! source_metadata_identifier: "4609321"
//! files:
//!   - id: "00000001"
//!     path: files/00000001.tif
//!     mime_type: image/tiff
//!   - path: files/mets.xml
//!     mime_type: application/xml
//!     role: structure-map-source
//! structure:
//!   nodes:
//!     - label: leaf 1
//!       nodes:
//!         - label: leaf 1. recto
//!           proxy: "00000001"
//! ```
//!
//! Multi-volume descriptors put a `volumes:` list under a shared title. A
//! top-level `source_metadata_identifier` then belongs to the work.
//!
//! Files without an `id` are referenced by their file stem (`00000001` for
//! `00000001.tif`). When the stem is already taken in the volume, content
//! files keep it and the other file falls back to its full file name
//! (`00000001.txt`).

mod parser;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::graph::{CollectionRef, ViewingDirection, Visibility};
use crate::ordering::OrderingNode;

pub use parser::parse_descriptor;

/// Parsed, validated descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// Shared title; equal to the volume title for single-volume input
    pub title: Vec<String>,
    pub visibility: Option<Visibility>,
    pub viewing_direction: ViewingDirection,
    /// Catalog identifier of the work; only set for multi-volume input
    pub source_metadata_identifier: Option<String>,
    pub replaces: Option<String>,
    pub collections: Vec<CollectionRef>,
    pub volumes: Vec<VolumeRecord>,
}

impl Descriptor {
    /// More than one volume means the volumes are grouped under a work
    pub fn is_multi_volume(&self) -> bool {
        self.volumes.len() > 1
    }

    /// Every file reference across all volumes
    pub fn file_count(&self) -> usize {
        self.volumes.iter().map(|v| v.files.len()).sum()
    }
}

/// One volume's worth of source information
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub title: Vec<String>,
    pub visibility: Option<Visibility>,
    pub viewing_direction: ViewingDirection,
    pub source_metadata_identifier: Option<String>,
    pub replaces: Option<String>,
    /// Files in page order
    pub files: Vec<FileReference>,
    pub structure: Option<OrderingNode>,
}

impl VolumeRecord {
    pub fn file(&self, id: &str) -> Option<&FileReference> {
        self.files.iter().find(|f| f.id == id)
    }
}

/// Where a file's bytes come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum ContentSource {
    Path(PathBuf),
    Uri(Url),
}

impl ContentSource {
    /// Final path segment, used as the stored file name
    pub fn file_name(&self) -> String {
        match self {
            ContentSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ContentSource::Uri(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentSource::Path(path) => write!(f, "{}", path.display()),
            ContentSource::Uri(url) => write!(f, "{}", url),
        }
    }
}

/// What a referenced file is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileRole {
    /// A page image or other primary content
    #[default]
    Content,
    /// Extracted text for a page
    OcrText,
    /// Source document the structure tree was derived from
    StructureMapSource,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Content => "content",
            FileRole::OcrText => "ocr-text",
            FileRole::StructureMapSource => "structure-map-source",
        }
    }
}

impl std::str::FromStr for FileRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "content" => Ok(FileRole::Content),
            "ocr-text" | "ocr" => Ok(FileRole::OcrText),
            "structure-map-source" | "structure-map" => Ok(FileRole::StructureMapSource),
            other => Err(format!("unknown file role '{}'", other)),
        }
    }
}

/// One file listed in a volume
#[derive(Debug, Clone, PartialEq)]
pub struct FileReference {
    /// Identifier the structure tree uses to point at this file
    pub id: String,
    pub source: ContentSource,
    pub mime_type: String,
    pub role: FileRole,
    pub title: Option<String>,
    pub replaces: Option<String>,
    /// For OCR text: id of the content file whose unit it joins
    pub attach_to: Option<String>,
}

impl FileReference {
    pub fn file_name(&self) -> String {
        self.source.file_name()
    }
}

/// Read and parse a descriptor file
///
/// Relative file paths resolve against the descriptor's directory.
pub async fn load_descriptor(path: impl AsRef<Path>) -> Result<Descriptor> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading descriptor");

    let text = tokio::fs::read_to_string(path).await?;

    parse_descriptor(&text, path.parent())
}
