//! Folio Ingest - command line entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use folio_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use folio_ingest::actor::{AttachmentActor, StoreAttachmentActor};
use folio_ingest::bibdata::{BibliographicLookup, HttpBibliographicLookup, StaticLookup};
use folio_ingest::config::Config;
use folio_ingest::curation;
use folio_ingest::descriptor::load_descriptor;
use folio_ingest::gateway::PersistenceGateway;
use folio_ingest::index::{MemorySearchIndex, SearchIndex, SolrIndex};
use folio_ingest::jobs::{ChannelJobQueue, DeferredWorker};
use folio_ingest::store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use folio_ingest::{AssociationMethod, EntityId, IngestCounter, IngestPipeline};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "folio-ingest", version, about = "Ingest digitized volumes from YAML descriptors")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a descriptor file
    Ingest {
        /// Path to the YAML descriptor
        descriptor: PathBuf,

        /// When content and metadata are attached (individual, batch, none)
        #[arg(long, env = "FILE_ASSOCIATION_METHOD")]
        method: Option<AssociationMethod>,

        /// Keep everything in process memory instead of S3 / Solr
        #[arg(long)]
        in_memory: bool,
    },

    /// Save a new member order for a resource or work
    Reorder {
        id: String,
        #[arg(required = true)]
        member_ids: Vec<String>,
    },

    /// Sort a work's members by title
    Alphabetize { work_id: String },

    /// Re-fetch catalog metadata for a resource
    Refresh { resource_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("folio-ingest".to_string())
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config).context("Failed to initialize logging")?;

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Ingest {
            descriptor,
            method,
            in_memory,
        } => ingest(&config, descriptor, method.unwrap_or(config.ingest.method), in_memory).await,

        Commands::Reorder { id, member_ids } => {
            let gateway = gateway(&config, false).await?;
            let order = member_ids.into_iter().map(EntityId::from).collect();
            let record = curation::save_order(&gateway, &EntityId::from(id), order).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        },

        Commands::Alphabetize { work_id } => {
            let gateway = gateway(&config, false).await?;
            let record = curation::alphabetize_members(&gateway, &EntityId::from(work_id)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        },

        Commands::Refresh { resource_id } => {
            let gateway = gateway(&config, false).await?;
            let lookup = lookup(&config)?;
            let resource =
                curation::refresh_remote_metadata(&gateway, lookup.as_ref(), &EntityId::from(resource_id))
                    .await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
            Ok(())
        },
    }
}

async fn gateway(config: &Config, in_memory: bool) -> anyhow::Result<Arc<PersistenceGateway>> {
    let store: Arc<dyn ObjectStore> = if in_memory {
        Arc::new(MemoryObjectStore::new())
    } else {
        Arc::new(
            S3ObjectStore::new(config.storage.clone())
                .await
                .context("Failed to initialize object store")?,
        )
    };

    let index: Arc<dyn SearchIndex> = match (&config.search.url, in_memory) {
        (Some(url), false) => Arc::new(SolrIndex::new(url.clone(), config.solr_timeout())?),
        _ => Arc::new(MemorySearchIndex::new()),
    };

    Ok(Arc::new(PersistenceGateway::new(store, index, config.retry_policy())))
}

fn lookup(config: &Config) -> anyhow::Result<Arc<dyn BibliographicLookup>> {
    Ok(match &config.bibdata.url {
        Some(url) => Arc::new(HttpBibliographicLookup::new(url.clone(), config.bibdata_timeout())?),
        None => Arc::new(StaticLookup::new()),
    })
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn ingest(
    config: &Config,
    path: PathBuf,
    method: AssociationMethod,
    in_memory: bool,
) -> anyhow::Result<()> {
    let descriptor = load_descriptor(&path)
        .await
        .with_context(|| format!("Failed to load descriptor {}", path.display()))?;
    let gateway = gateway(config, in_memory).await?;
    let actor: Arc<dyn AttachmentActor> = Arc::new(StoreAttachmentActor::new(gateway.clone())?);

    let mut builder = IngestPipeline::builder(gateway.clone())
        .method(method)
        .actor(actor.clone())
        .lookup(lookup(config)?)
        .concurrency(config.ingest.concurrency)
        .default_visibility(config.ingest.default_visibility);

    let worker = if method == AssociationMethod::None {
        let (queue, receiver) = ChannelJobQueue::new();
        builder = builder.jobs(Arc::new(queue));
        Some(DeferredWorker::new(receiver, gateway.clone(), actor).spawn())
    } else {
        None
    };
    let pipeline = builder.build()?;

    let counter = IngestCounter::new();
    let reader = counter.reader();
    let spinner = create_spinner(&format!("Ingesting {}", path.display()));
    let progress = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            loop {
                spinner.set_message(format!("{} file units ingested", reader.value()));
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };

    let result = pipeline.ingest_with_counter(&descriptor, counter).await;
    progress.abort();
    spinner.finish_and_clear();

    // The queue lives in the pipeline; dropping it lets the worker drain and stop
    drop(pipeline);
    let report = result?;

    if let Some(worker) = worker {
        let stats = worker.await.context("Deferred worker panicked")?;
        info!(completed = stats.completed, failed = stats.failed, "Deferred jobs finished");
        if stats.failed > 0 {
            anyhow::bail!("{} deferred jobs failed", stats.failed);
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
