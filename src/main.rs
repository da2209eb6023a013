//! State-store trace indexer
//!
//! `watch` follows the node's live trace stream; `import` backfills the
//! relational store from a historical snapshot. Both modes share the
//! coordinator, decoders and module processors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statewatch::bulk::{BulkImporter, SnapshotStore};
use statewatch::config::IndexerConfig;
use statewatch::coordinator::Coordinator;
use statewatch::database::{PostgresSink, WritebackSink};
use statewatch::decoder::codec;
use statewatch::processors::{build_processors, ModuleProcessor, ProcessorContext};
use statewatch::trace::TraceWatcher;

#[derive(Parser)]
#[command(name = "statewatch")]
#[command(about = "Change-data-capture indexer for chain state-store traces")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "statewatch.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the live trace stream
    Watch,
    /// Backfill from a historical snapshot
    Import {
        /// Override the snapshot path from the config file
        #[arg(long)]
        snapshot_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        IndexerConfig::from_file(&cli.config)?
    } else {
        warn!("config file not found, using defaults: {}", cli.config);
        IndexerConfig::default()
    };

    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    init_logging(&config)?;

    info!("starting statewatch");
    info!(chain = %config.indexer.chain_name, trace = %config.trace.path.display());

    config.check()?;
    let ctx = ProcessorContext {
        chain_name: config.indexer.chain_name.clone(),
        codec: codec::from_name(&config.indexer.codec)?,
    };
    let processors = build_processors(&config.indexer.modules, &ctx)?;
    info!(modules = processors.len(), "configuration validated");

    if cli.dry_run {
        info!("dry run mode, configuration is valid, exiting");
        return Ok(());
    }

    let sink = PostgresSink::connect(&config.database).await?;
    sink.apply_migrations(&processors).await?;

    match cli.command {
        Command::Watch => run_watch(config, processors, sink).await,
        Command::Import { snapshot_path } => {
            let path = snapshot_path.unwrap_or_else(|| config.snapshot.path.clone());
            run_import(processors, sink, &path).await
        }
    }
}

/// Live mode: watcher -> coordinator -> persist/error consumers.
async fn run_watch(
    config: IndexerConfig,
    processors: Vec<Arc<dyn ModuleProcessor>>,
    sink: PostgresSink,
) -> Result<()> {
    let (ops_tx, ops_rx) = mpsc::channel(config.trace.channel_capacity);
    let (writeback_tx, mut writeback_rx) = mpsc::unbounded_channel();
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let (watch_error_tx, mut watch_error_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The coordinator stalls without a writeback consumer, so the
    // persist task starts before the routing loop.
    let sink = Arc::new(sink);
    let persist_sink = sink.clone();
    let persist_task = tokio::spawn(async move {
        while let Some(batch) = writeback_rx.recv().await {
            persist_sink.persist(batch).await;
        }
    });

    let error_task = tokio::spawn(async move {
        let mut processing_open = true;
        let mut watcher_open = true;
        while processing_open || watcher_open {
            tokio::select! {
                err = error_rx.recv(), if processing_open => match err {
                    Some(e) => error!("processing error: {e}"),
                    None => processing_open = false,
                },
                err = watch_error_rx.recv(), if watcher_open => match err {
                    Some(e) => warn!("trace watcher: {e}"),
                    None => watcher_open = false,
                },
            }
        }
    });

    let watcher = TraceWatcher::new(
        config.trace.path.clone(),
        config.trace.watched_operations.clone(),
        Duration::from_millis(config.trace.retry_delay_ms),
        ops_tx,
        watch_error_tx,
        shutdown_rx.clone(),
    );
    let watcher_task = tokio::spawn(watcher.watch());

    let coordinator = Coordinator::new(processors, writeback_tx, error_tx);
    let routing_task = tokio::spawn(coordinator.run(ops_rx, shutdown_rx));

    info!("indexer started, press ctrl-c to shut down");
    signal::ctrl_c().await?;
    info!("received shutdown signal");
    shutdown_tx.send(true)?;

    watcher_task.await?;
    let coordinator = routing_task.await?;

    // Drain the open block before the channels close.
    coordinator.flush_all();
    drop(coordinator);

    futures::future::join_all(vec![persist_task, error_task]).await;
    info!("shut down cleanly");
    Ok(())
}

/// Bulk mode: snapshot workers -> coordinator -> collected batches.
async fn run_import(
    processors: Vec<Arc<dyn ModuleProcessor>>,
    sink: PostgresSink,
    snapshot_path: &std::path::Path,
) -> Result<()> {
    let (writeback_tx, writeback_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();

    let coordinator = Arc::new(Coordinator::new(processors, writeback_tx, error_tx));
    let snapshot = Arc::new(SnapshotStore::open(snapshot_path)?);

    let importer = BulkImporter::new(coordinator, snapshot);
    let stats = importer.run(writeback_rx, error_rx, &sink).await?;

    for (module, records) in &stats.records {
        info!(module = *module, records = *records, "scanned");
    }
    info!(
        height = stats.snapshot_height,
        batches = stats.batches,
        rows = stats.rows,
        "import finished"
    );
    Ok(())
}

fn init_logging(config: &IndexerConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("statewatch={}", config.monitoring.log_level).into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}
