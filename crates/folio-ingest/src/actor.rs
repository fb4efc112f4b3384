//! Attachment actor
//!
//! The two side effects applied to a single entity: storing a file's bytes,
//! and writing an entity's metadata (record plus search document). Strategies
//! decide when these run; the actor only knows how.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_common::checksum::sha256_bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::descriptor::ContentSource;
use crate::error::{ContentFailure, IngestError, Result};
use crate::gateway::PersistenceGateway;
use crate::graph::{AttachedContent, EntityId, ResourceGraph, StoredFile};

/// Per-call metadata options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    /// Commit the search index after writing
    pub commit: bool,
}

#[async_trait]
pub trait AttachmentActor: Send + Sync {
    /// Store one file's bytes for `target`; idempotent per file key
    async fn attach_content(&self, target: &EntityId, file: &StoredFile) -> Result<AttachedContent>;

    /// Write metadata for `target`, or for every entity in the graph when
    /// `target` is `None`
    async fn create_metadata(
        &self,
        target: Option<&EntityId>,
        graph: &mut ResourceGraph,
        options: &MetadataOptions,
    ) -> Result<()>;
}

/// Actor writing through the persistence gateway
pub struct StoreAttachmentActor {
    gateway: Arc<PersistenceGateway>,
    client: Client,
}

impl StoreAttachmentActor {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("Folio-Ingest/1.0")
            .build()?;

        Ok(Self { gateway, client })
    }

    async fn read_source(&self, source: &ContentSource) -> std::result::Result<Vec<u8>, ContentFailure> {
        let path = match source {
            ContentSource::Path(path) => path.clone(),
            ContentSource::Uri(url) if url.scheme() == "file" => {
                url.to_file_path().map_err(|_| ContentFailure::Fetch {
                    uri: url.to_string(),
                    message: "not a local file path".to_string(),
                })?
            },
            ContentSource::Uri(url) => return self.fetch(url.as_str()).await,
        };

        tokio::fs::read(&path)
            .await
            .map_err(|source| ContentFailure::Read {
                path: path.display().to_string(),
                source,
            })
    }

    async fn fetch(&self, uri: &str) -> std::result::Result<Vec<u8>, ContentFailure> {
        let failure = |message: String| ContentFailure::Fetch {
            uri: uri.to_string(),
            message,
        };

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failure(format!("HTTP error: {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| failure(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AttachmentActor for StoreAttachmentActor {
    #[instrument(skip(self, file), fields(key = %file.key))]
    async fn attach_content(&self, target: &EntityId, file: &StoredFile) -> Result<AttachedContent> {
        let attach_error = |source: ContentFailure| IngestError::ContentAttach {
            target: target.clone(),
            source,
        };

        let data = self.read_source(&file.source).await.map_err(attach_error)?;
        self.gateway
            .put_content(&file.key, &data, &file.mime_type)
            .await
            .map_err(|e| attach_error(ContentFailure::Store(e)))?;

        debug!(bytes = data.len(), "Attached content");

        Ok(AttachedContent {
            key: file.key.clone(),
            size: data.len() as u64,
            checksum: sha256_bytes(&data),
        })
    }

    #[instrument(skip(self, graph))]
    async fn create_metadata(
        &self,
        target: Option<&EntityId>,
        graph: &mut ResourceGraph,
        options: &MetadataOptions,
    ) -> Result<()> {
        let targets: Vec<EntityId> = match target {
            Some(id) => vec![id.clone()],
            None => graph
                .units()
                .iter()
                .map(|u| u.id.clone())
                .chain(graph.resource_ids())
                .chain(graph.work().map(|w| w.id.clone()))
                .collect(),
        };

        let mut last = None;
        for id in targets {
            let written = self
                .gateway
                .write_entity(graph, &id)
                .await
                .map_err(|source| IngestError::MetadataWrite {
                    target: id.clone(),
                    source,
                })?;
            last = Some(written);
        }

        if options.commit {
            if let Some(anchor) = last {
                self.gateway
                    .commit_index()
                    .await
                    .map_err(|source| IngestError::MetadataWrite {
                        target: anchor,
                        source,
                    })?;
            }
        }

        Ok(())
    }
}
