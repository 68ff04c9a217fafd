//! Homelens daemon for background photo ingestion.
//!
//! Watches a spool directory for dropped image files, moves their bytes
//! into object storage, and queues them for inference and indexing.
//! Files placed in a numeric subdirectory are associated with that
//! listing id; files at the spool root are ingested unassociated.
//!
//! ## Usage
//!
//! ```bash
//! homelens-daemon                  # Run in foreground
//! homelens-daemon --once           # Drain the spool once and exit
//! homelens-daemon --spool /in      # Watch a specific directory
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

use homelens::aggregate::AggregationEngine;
use homelens::config::{Config, ModelProviderType};
use homelens::db::Database;
use homelens::inference::{OpenAiClient, StubModel, Vision};
use homelens::ingest::Ingestor;
use homelens::jobs::{IngestJob, JobQueue, WorkerPool};
use homelens::logging;
use homelens::storage::{FsStore, ObjectStore};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "heic"];

/// Daemon configuration
struct DaemonConfig {
    /// Poll interval for checking the spool directory (seconds)
    poll_interval: u64,
    /// Run once and exit
    once: bool,
    /// Config path override
    config_path: Option<PathBuf>,
    /// Spool directory override
    spool_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: 30,
            once: false,
            config_path: None,
            spool_dir: None,
        }
    }
}

fn main() -> Result<()> {
    let daemon_config = parse_args();

    logging::init(None)?;

    info!("Homelens daemon starting...");

    let config = match &daemon_config.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let db = Database::open(&config.db_path)?;
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path);

    let store: Arc<dyn ObjectStore> =
        Arc::new(FsStore::open(config.storage.root.clone()).context("opening object store")?);

    let vision: Arc<dyn Vision> = match config.model.provider {
        ModelProviderType::Stub => Arc::new(StubModel::new(
            0,
            config.embeddings.image_dim,
            config.embeddings.text_dim,
        )),
        ModelProviderType::OpenAI => Arc::new(OpenAiClient::from_config(&config.model)),
    };

    let ingestor = Arc::new(Ingestor::new(
        vision,
        config.embeddings.image_dim,
        config.embeddings.text_dim,
    ));
    let aggregator = Arc::new(AggregationEngine::new(
        config.aggregation.calculation_version.clone(),
        config.aggregation.top_features,
    ));

    let queue = Arc::new(JobQueue::new());
    let pool = WorkerPool::start(
        queue.clone(),
        config.workers.count,
        config.db_path.clone(),
        store.clone(),
        ingestor,
        aggregator,
    );
    info!("Started {} ingest worker(s)", config.workers.count);

    let spool_dir = daemon_config
        .spool_dir
        .clone()
        .unwrap_or_else(|| config.storage.root.join("../spool"));
    std::fs::create_dir_all(&spool_dir).context("creating spool directory")?;

    if daemon_config.once {
        info!("Running in single-shot mode");
        drain_spool(&spool_dir, &*store, &queue)?;
    } else {
        info!(
            "Running in daemon mode, polling {:?} every {} seconds",
            spool_dir, daemon_config.poll_interval
        );
        loop {
            if let Err(e) = drain_spool(&spool_dir, &*store, &queue) {
                warn!("Spool scan failed: {}", e);
            }
            let pruned = queue.prune_finished();
            if pruned > 0 {
                info!("Pruned {} finished job result(s)", pruned);
            }
            thread::sleep(Duration::from_secs(daemon_config.poll_interval));
        }
    }

    // Drains remaining jobs before joining
    pool.shutdown();

    info!("Homelens daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DaemonConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                config.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(interval) = args[i + 1].parse() {
                        config.poll_interval = interval;
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--spool" | "-s" => {
                if i + 1 < args.len() {
                    config.spool_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_help() {
    println!(
        r#"homelens-daemon - Background photo ingestion for Homelens

USAGE:
    homelens-daemon [OPTIONS]

OPTIONS:
    --once, -1          Drain the spool directory once and exit
    --interval, -i N    Poll interval in seconds (default: 30)
    --config, -c PATH   Path to config file
    --spool, -s PATH    Spool directory to watch
    --help, -h          Show this help message

ENVIRONMENT:
    HOMELENS_LOG        Log level (trace, debug, info, warn, error)

Dropped files are moved into object storage and queued for inference.
A numeric subdirectory name associates its files with that listing id:

    spool/42/kitchen.jpg    ->  ingested for listing 42
    spool/porch.jpg         ->  ingested unassociated
"#
    );
}

/// Move every image file out of the spool into object storage and queue
/// an ingestion job for it.
fn drain_spool(spool_dir: &Path, store: &dyn ObjectStore, queue: &JobQueue) -> Result<usize> {
    let mut queued = 0;

    for entry in WalkDir::new(spool_dir).max_depth(2).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let listing_id = listing_id_from_path(spool_dir, path);

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Could not read spooled file {:?}: {}", path, e);
                continue;
            }
        };

        let locator = match store.put(&bytes, &filename) {
            Ok(l) => l,
            Err(e) => {
                warn!("Could not store spooled file {:?}: {}", path, e);
                continue;
            }
        };

        // The object store copy is now authoritative
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove spooled file {:?}: {}", path, e);
        }

        let id = queue.submit(IngestJob {
            filename,
            locator,
            listing_id,
        });
        info!("Queued job {} for {:?} (listing {:?})", id.0, path, listing_id);
        queued += 1;
    }

    if queued > 0 {
        info!("Queued {} spooled file(s)", queued);
    }
    Ok(queued)
}

/// Listing association from the spool layout: a file one level down in
/// a directory whose name parses as an integer belongs to that listing.
fn listing_id_from_path(spool_dir: &Path, path: &Path) -> Option<i64> {
    let parent = path.parent()?;
    if parent == spool_dir {
        return None;
    }
    parent.file_name()?.to_str()?.parse().ok()
}
