//! The run command: full ingest → clean → aggregate pipeline

use crate::app::pipeline::{EngineStages, PipelineOrchestrator, RunReport};
use crate::app::services::audit::{AuditSink, JsonlAuditSink, MemoryAuditSink};
use crate::app::services::partition::{JsonlStore, MemoryStore, PartitionStore};
use crate::cli::args::{OutputFormat, RunArgs};
use crate::cli::commands::shared::{print_run_report, setup_logging};
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Execute the run command
pub async fn run_run(args: RunArgs, cancellation: CancellationToken) -> Result<RunReport> {
    setup_logging(args.get_log_level())?;
    args.validate()?;
    let config = args.to_config()?;

    info!(
        "Starting pipeline run: source '{}', {} partitions, {} workers",
        config.source.path.display(),
        config.store.partition_count,
        config.processing.workers
    );

    // Store selection: file-backed when a root is given, in-memory otherwise
    let store: Arc<dyn PartitionStore> = match &config.store.root {
        Some(root) => {
            info!("Using file-backed store at '{}'", root.display());
            Arc::new(JsonlStore::open(root, config.store.partition_count)?)
        }
        None => {
            info!("Using in-memory store (nothing survives this process)");
            Arc::new(MemoryStore::new(config.store.partition_count))
        }
    };

    let audit: Arc<dyn AuditSink> = match &config.store.audit_path {
        Some(path) => Arc::new(JsonlAuditSink::open(path)?),
        None => Arc::new(MemoryAuditSink::new()),
    };

    let stages = EngineStages::new(config, store, audit, cancellation.clone());
    let mut orchestrator = PipelineOrchestrator::new(stages, cancellation);
    let report = orchestrator.execute().await;

    match args.output_format {
        OutputFormat::Human => print_run_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(report)
}
