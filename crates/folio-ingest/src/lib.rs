//! Folio Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests descriptors of digitized archival volumes and materializes them as
//! a persisted object graph: works containing ordered resources, resources
//! containing ordered file units, each with binary content, metadata and a
//! hierarchical logical order.
//!
//! # Architecture
//!
//! - **descriptor**: YAML descriptor parsing into volume records
//! - **ordering**: the recursive logical-order tree
//! - **graph**: entity types, identifier minting and the graph builder
//! - **strategy**: when content and metadata attachment happen
//!   (individual, batch, or deferred to background jobs)
//! - **actor**: the two attachment operations for a single entity
//! - **gateway**: retrying persistence boundary around every network write
//! - **counter**: per-run progress counter
//! - **orchestrator**: parse, build, associate, report
//!
//! Collaborators live behind traits: `store::ObjectStore`,
//! `index::SearchIndex`, `bibdata::BibliographicLookup` and `jobs::JobQueue`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use folio_ingest::{
//!     gateway::{PersistenceGateway, RetryPolicy},
//!     index::MemorySearchIndex,
//!     orchestrator::IngestPipeline,
//!     store::MemoryObjectStore,
//!     strategy::AssociationMethod,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Arc::new(PersistenceGateway::new(
//!         Arc::new(MemoryObjectStore::new()),
//!         Arc::new(MemorySearchIndex::new()),
//!         RetryPolicy::default(),
//!     ));
//!     let pipeline = IngestPipeline::builder(gateway)
//!         .method(AssociationMethod::Batch)
//!         .build()?;
//!     let report = pipeline.ingest_path("volume.yml").await?;
//!     tracing::info!(file_units = report.file_units, "done");
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod bibdata;
pub mod config;
pub mod counter;
pub mod curation;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod index;
pub mod jobs;
pub mod orchestrator;
pub mod ordering;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use counter::{IngestCounter, ProgressReader};
pub use descriptor::{parse_descriptor, Descriptor};
pub use error::{IngestError, Result};
pub use graph::{EntityId, ResourceGraph};
pub use orchestrator::{IngestPipeline, IngestReport};
pub use ordering::OrderingNode;
pub use strategy::AssociationMethod;
