//! YAML descriptor parser

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ContentSource, Descriptor, FileReference, FileRole, VolumeRecord};
use crate::error::{IngestError, Result};
use crate::graph::{CollectionRef, ViewingDirection, Visibility};
use crate::ordering::OrderingNode;

/// A title may be written as a single string or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TitleField {
    One(String),
    Many(Vec<String>),
}

impl TitleField {
    fn into_values(self) -> Vec<String> {
        let values = match self {
            TitleField::One(title) => vec![title],
            TitleField::Many(titles) => titles,
        };
        values
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawVolume {
    #[serde(default)]
    title: Option<TitleField>,
    #[serde(default, alias = "rights")]
    visibility: Option<String>,
    #[serde(default)]
    viewing_direction: Option<String>,
    #[serde(default, alias = "bibdata_id")]
    source_metadata_identifier: Option<String>,
    #[serde(default)]
    replaces: Option<String>,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    structure: Option<OrderingNode>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    id: Option<String>,
    path: String,
    #[serde(alias = "mime")]
    mime_type: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    replaces: Option<String>,
    #[serde(default)]
    attach_to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    slug: String,
    #[serde(default)]
    title: Option<TitleField>,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(flatten)]
    top: RawVolume,
    #[serde(default)]
    collections: Vec<RawCollection>,
    #[serde(default)]
    volumes: Vec<RawVolume>,
}

fn malformed(message: impl Into<String>) -> IngestError {
    IngestError::MalformedDescriptor(message.into())
}

/// Parse descriptor text
///
/// `base_dir` anchors relative file paths, normally the descriptor's own
/// directory. Fails with `MalformedDescriptor` when required fields are
/// missing or a value cannot be understood.
pub fn parse_descriptor(text: &str, base_dir: Option<&Path>) -> Result<Descriptor> {
    if text.trim().is_empty() {
        return Err(malformed("descriptor is empty"));
    }

    let raw: RawDescriptor = serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))?;

    let top_title = raw.top.title.map(TitleField::into_values).unwrap_or_default();
    let top_visibility = parse_visibility(raw.top.visibility.as_deref())?;
    let top_direction = parse_direction(raw.top.viewing_direction.as_deref())?;

    let collections = raw
        .collections
        .into_iter()
        .map(|c| {
            let mut title = c.title.map(TitleField::into_values).unwrap_or_default();
            if title.is_empty() {
                title.push(c.slug.clone());
            }
            CollectionRef {
                slug: c.slug,
                title,
            }
        })
        .collect();

    let mut work_identifier = None;
    let volumes = if raw.volumes.is_empty() {
        if raw.top.files.is_empty() {
            return Err(malformed("descriptor lists no files"));
        }
        let volume = RawVolume {
            title: None,
            visibility: None,
            viewing_direction: None,
            source_metadata_identifier: raw.top.source_metadata_identifier,
            replaces: None,
            files: raw.top.files,
            structure: raw.top.structure,
        };
        vec![build_volume(volume, &top_title, top_visibility, top_direction, base_dir)?]
    } else {
        if !raw.top.files.is_empty() {
            return Err(malformed("descriptor mixes top-level files with volumes"));
        }
        if raw.top.structure.is_some() {
            return Err(malformed("structure belongs to a volume, not to a multi-volume descriptor"));
        }
        work_identifier = clean_identifier(raw.top.source_metadata_identifier);
        raw.volumes
            .into_iter()
            .map(|v| build_volume(v, &top_title, top_visibility, top_direction, base_dir))
            .collect::<Result<Vec<_>>>()?
    };

    if top_title.is_empty() && volumes.len() > 1 {
        return Err(malformed("multi-volume descriptor has no title"));
    }

    let title = if top_title.is_empty() {
        volumes.first().map(|v| v.title.clone()).unwrap_or_default()
    } else {
        top_title
    };

    debug!(volumes = volumes.len(), "Parsed descriptor");

    Ok(Descriptor {
        title,
        visibility: top_visibility,
        viewing_direction: top_direction.unwrap_or_default(),
        source_metadata_identifier: work_identifier,
        replaces: raw.top.replaces,
        collections,
        volumes,
    })
}

fn build_volume(
    raw: RawVolume,
    inherited_title: &[String],
    inherited_visibility: Option<Visibility>,
    inherited_direction: Option<ViewingDirection>,
    base_dir: Option<&Path>,
) -> Result<VolumeRecord> {
    let mut title = raw.title.map(TitleField::into_values).unwrap_or_default();
    if title.is_empty() {
        title = inherited_title.to_vec();
    }
    if title.is_empty() {
        return Err(malformed("descriptor has no title"));
    }

    let visibility = parse_visibility(raw.visibility.as_deref())?.or(inherited_visibility);
    let viewing_direction = parse_direction(raw.viewing_direction.as_deref())?
        .or(inherited_direction)
        .unwrap_or_default();

    let mut files = Vec::with_capacity(raw.files.len());
    let mut unnamed = Vec::new();
    let mut seen = HashSet::new();
    for raw_file in raw.files {
        let explicit = raw_file.id.clone();
        let file = build_file(raw_file, base_dir)?;
        match explicit {
            Some(id) => claim_id(&mut seen, &id)?,
            None => unnamed.push(files.len()),
        }
        files.push(file);
    }

    // Content files claim their stem first so OCR text sharing a page's
    // stem can still `attach_to` it
    unnamed.sort_by_key(|&i| (files[i].role != FileRole::Content, i));
    for i in unnamed {
        let stem = file_stem(&files[i].source);
        let id = if seen.contains(&stem) { files[i].file_name() } else { stem };
        claim_id(&mut seen, &id)?;
        files[i].id = id;
    }

    for file in &files {
        if let Some(target) = &file.attach_to {
            if file.role != FileRole::OcrText {
                return Err(malformed(format!(
                    "file '{}' uses attach_to but is not ocr-text",
                    file.id
                )));
            }
            let joins_content = files
                .iter()
                .any(|f| &f.id == target && f.role == FileRole::Content);
            if !joins_content {
                return Err(malformed(format!(
                    "file '{}' attaches to unknown content file '{}'",
                    file.id, target
                )));
            }
        }
    }

    Ok(VolumeRecord {
        title,
        visibility,
        viewing_direction,
        source_metadata_identifier: clean_identifier(raw.source_metadata_identifier),
        replaces: raw.replaces,
        files,
        structure: raw.structure,
    })
}

fn build_file(raw: RawFile, base_dir: Option<&Path>) -> Result<FileReference> {
    let source = resolve_source(&raw.path, base_dir)?;

    raw.mime_type
        .parse::<mime::Mime>()
        .map_err(|e| malformed(format!("invalid mime type '{}': {}", raw.mime_type, e)))?;

    let role = match raw.role.as_deref() {
        Some(role) => role.parse::<FileRole>().map_err(malformed)?,
        None => FileRole::Content,
    };

    Ok(FileReference {
        id: raw.id.unwrap_or_default(),
        source,
        mime_type: raw.mime_type,
        role,
        title: raw.title,
        replaces: raw.replaces,
        attach_to: raw.attach_to,
    })
}

fn claim_id(seen: &mut HashSet<String>, id: &str) -> Result<()> {
    if !seen.insert(id.to_string()) {
        return Err(malformed(format!("duplicate file id '{}'", id)));
    }
    Ok(())
}

/// File stem of the source, e.g. `00000001` for `files/00000001.tif`
fn file_stem(source: &ContentSource) -> String {
    let name = source.file_name();
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

fn resolve_source(raw: &str, base_dir: Option<&Path>) -> Result<ContentSource> {
    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|e| malformed(format!("invalid uri '{}': {}", raw, e)))?;
        return match url.scheme() {
            "file" | "http" | "https" => Ok(ContentSource::Uri(url)),
            scheme => Err(malformed(format!("unsupported uri scheme '{}'", scheme))),
        };
    }

    let path = PathBuf::from(raw);
    let path = match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    };
    Ok(ContentSource::Path(path))
}

fn parse_visibility(raw: Option<&str>) -> Result<Option<Visibility>> {
    raw.map(|v| v.parse::<Visibility>().map_err(malformed))
        .transpose()
}

fn parse_direction(raw: Option<&str>) -> Result<Option<ViewingDirection>> {
    raw.map(|v| v.parse::<ViewingDirection>().map_err(malformed))
        .transpose()
}

fn clean_identifier(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
