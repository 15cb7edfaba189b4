//! Searchlab CLI - Command Line Interface
//!
//! Runs the audit harness against a local data directory and inspects
//! persisted tables.
//!
//! Key Features:
//! - Audit scheduler with graceful shutdown
//! - JSON export of the first rows of a table
//! - Facet counts per column
//! - Equality selects through the table registry, locally or remote
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use clap::{Parser, Subcommand};
use searchlab_audit::{AuditScheduler, AuditTask, RequestAudit};
use searchlab_common::{Result, SearchlabConfig, SearchlabError};
use searchlab_storage::{LocalBackend, StorageBackend, StoragePath};
use searchlab_table::codec::{self, DecodeOptions};
use searchlab_table::{ColumnType, IndexedTable, TableRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "searchlab")]
#[command(author = "Searchlab Development Team")]
#[command(version = "0.1.0")]
#[command(about = "Searchlab table store CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the audit scheduler until interrupted
    Run {
        #[arg(short, long, default_value = "searchlab.toml")]
        config: PathBuf,

        /// Override the configured data directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the first rows of a stored table as JSON
    Head {
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Object path, e.g. searchlab/audit/requests.csv
        #[arg(short, long)]
        path: String,

        #[arg(short = 'n', long, default_value = "10")]
        rows: usize,

        /// Print a header row followed by value arrays
        #[arg(long)]
        columns: bool,
    },
    /// Count rows per distinct value of a column
    Facet {
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        #[arg(short, long)]
        path: String,

        column: String,
    },
    /// Select rows with column:value filters
    Where {
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        #[arg(short, long)]
        path: String,

        /// Remote registry base URL, tried before the local table
        #[arg(long)]
        remote: Option<String>,

        /// Filters of the form column:value
        #[arg(required = true)]
        selects: Vec<String>,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, data_dir } => run(&config, data_dir).await,
        Commands::Head {
            data_dir,
            path,
            rows,
            columns,
        } => blocking(move || head(&data_dir, &path, rows, columns)).await,
        Commands::Facet {
            data_dir,
            path,
            column,
        } => blocking(move || facet(&data_dir, &path, &column)).await,
        Commands::Where {
            data_dir,
            path,
            remote,
            selects,
        } => blocking(move || select(&data_dir, &path, remote.as_deref(), &selects)).await,
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Table and registry I/O is blocking; keep it off the async workers.
async fn blocking<T: Send + 'static>(f: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SearchlabError::Internal(format!("blocking task failed: {}", e)))?
}

// =============================================================================
// Run
// =============================================================================

struct AuditService {
    scheduler: AuditScheduler,
    registry: TableRegistry,
}

impl AuditService {
    fn start(config: SearchlabConfig) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalBackend::new(config.storage.data_directory.clone())?);
        let audit = Arc::new(RequestAudit::from_config(&config, storage.clone())?);

        let registry = TableRegistry::from_config(&config.registry, storage, &config.storage.bucket);
        registry.register_shared("requests", audit.requests_snapshot());
        registry.register_shared("visitors", audit.visitors_snapshot());

        let scheduler = AuditScheduler::new(config.audit.cycle_period(), vec![audit as Arc<dyn AuditTask>]);
        scheduler.start()?;
        Ok(Self {
            scheduler,
            registry,
        })
    }

    fn stop(self) {
        self.scheduler.stop();
        for name in self.registry.table_names() {
            if let Err(e) = self.registry.store_table(&name) {
                tracing::warn!("failed to store table {}: {}", name, e);
            }
        }
    }
}

async fn run(config_path: &Path, data_dir: Option<PathBuf>) -> Result<()> {
    let mut config = if config_path.exists() {
        SearchlabConfig::from_file(config_path)?
    } else {
        tracing::warn!("{} not found, using defaults", config_path.display());
        SearchlabConfig::default()
    };
    if let Some(data_dir) = data_dir {
        config.storage.data_directory = data_dir;
    }
    config.validate()?;
    tracing::info!(
        "starting audit in {} every {:?}",
        config.storage.data_directory.display(),
        config.audit.cycle_period()
    );

    let service = blocking(move || AuditService::start(config)).await?;
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping audit...");
    blocking(move || {
        service.stop();
        Ok(())
    })
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// =============================================================================
// Inspection
// =============================================================================

fn load_table(data_dir: &Path, path: &str) -> Result<IndexedTable> {
    let storage = LocalBackend::new(data_dir.to_path_buf())?;
    let path = StoragePath::parse(path)?;
    codec::load(
        &storage,
        &path,
        |name| ColumnType::infer_from_name(name).unwrap_or(ColumnType::String),
        &DecodeOptions::default(),
    )
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn head(data_dir: &Path, path: &str, rows: usize, columns: bool) -> Result<()> {
    let table = load_table(data_dir, path)?;
    print_json(&table.head(rows).to_json(!columns))
}

fn facet(data_dir: &Path, path: &str, column: &str) -> Result<()> {
    let table = load_table(data_dir, path)?;
    if table.column_index(column).is_none() {
        return Err(SearchlabError::ColumnNotFound(column.to_string()));
    }
    for (value, count) in table.facet(column) {
        println!("{}\t{}", count, value);
    }
    Ok(())
}

fn select(data_dir: &Path, path: &str, remote: Option<&str>, selects: &[String]) -> Result<()> {
    let name = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string();

    let mut registry = TableRegistry::new();
    if let Some(url) = remote {
        registry.connect_remote(url, Duration::from_secs(5));
    }
    match load_table(data_dir, path) {
        Ok(table) => registry.set_table(&name, table),
        Err(e) if remote.is_some() => tracing::warn!("no local copy of {}: {}", path, e),
        Err(e) => return Err(e),
    }
    let result = registry.where_(&name, selects)?;
    print_json(&result.to_json(true))
}
