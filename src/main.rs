use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use discogs_importer::config::{AppConfig, CliConfig, FileConfig, SourceSettings};
use discogs_importer::dumps::{
    DumpCatalog, DumpSource, DumpType, LocalDumpSource, S3DumpSource, SqliteDumpMetadataStore,
};
use discogs_importer::entity_store::{EntityStore, SqliteEntityStore};
use discogs_importer::error::ImportError;
use discogs_importer::import::ImportOrchestrator;
use discogs_importer::records::EntityKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "discogs-importer", version)]
struct CliArgs {
    /// Path to a TOML config file. Values found there override the flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db (dump metadata) and discogs.db (entities).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Base URL of the S3-style bucket dumps are published to.
    #[clap(long)]
    pub source_url: Option<String>,

    /// Read dumps from a local directory instead of the bucket.
    #[clap(long, value_parser = parse_path)]
    pub source_dir: Option<PathBuf>,

    /// Commands written per transaction.
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Commands buffered between the XML decoder and the writer.
    #[clap(long)]
    pub queue_capacity: Option<usize>,

    /// User-Agent sent to the dump bucket.
    #[clap(long)]
    pub user_agent: Option<String>,

    /// Timeout in seconds for bucket listings and for connecting to downloads.
    #[clap(long)]
    pub request_timeout_sec: Option<u64>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Polls the dump source and records newly published dumps.
    Refresh,

    /// Imports the newest complete dump set.
    Import {
        /// Dump type to import, together with the types it depends on.
        #[clap(long)]
        target: Option<DumpType>,

        /// Re-import dumps that were already imported.
        #[clap(long)]
        force: bool,

        /// Poll the dump source before selecting the set.
        #[clap(long)]
        refresh: bool,
    },

    /// Shows known dumps, the selectable set and entity counts.
    Status,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        let target = match &self.command {
            CliCommand::Import { target, .. } => *target,
            _ => None,
        };
        CliConfig {
            db_dir: self.db_dir.clone(),
            source_url: self.source_url.clone(),
            source_dir: self.source_dir.clone(),
            target,
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity,
            user_agent: self.user_agent.clone(),
            request_timeout_sec: self.request_timeout_sec,
        }
    }
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn DumpSource>> {
    Ok(match &config.source {
        SourceSettings::Remote { base_url } => {
            info!("Using dump bucket at {}", base_url);
            Arc::new(S3DumpSource::new(
                base_url,
                &config.user_agent,
                config.request_timeout_sec,
            )?)
        }
        SourceSettings::Local { dir } => {
            info!("Using local dump directory {:?}", dir);
            Arc::new(LocalDumpSource::new(dir))
        }
    })
}

async fn refresh(catalog: &DumpCatalog, source: &dyn DumpSource) {
    let report = catalog.refresh(source).await;
    for discovered in report.new_records() {
        info!(
            "New {} dump published on {}: {}",
            discovered.dump_type, discovered.published_on, discovered.locator
        );
    }
    if report.is_clean() {
        info!("Refresh done, {} dumps checked", report.discovered.len());
    } else {
        warn!(
            "Refresh done with {} failures out of {} dump types",
            report.failures.len(),
            DumpType::ALL.len()
        );
    }
}

fn print_status(config: &AppConfig, catalog: &DumpCatalog, entities: &dyn EntityStore) -> Result<()> {
    println!("Dumps:");
    for dump_type in DumpType::ALL {
        match catalog.most_recent(dump_type)? {
            Some(record) => println!(
                "  {:<8} {}  {:<12} {}",
                dump_type.as_str(),
                record.published_on,
                if record.is_imported() { "imported" } else { "not imported" },
                record.fingerprint
            ),
            None => println!("  {:<8} none", dump_type.as_str()),
        }
    }

    match catalog.latest_complete_set_for(config.target) {
        Ok(set) => println!("Importable set for {}: {}", config.target, set.period()),
        Err(ImportError::DumpNotFound(_)) => println!("No importable set for {}", config.target),
        Err(e) => return Err(e.into()),
    }

    println!("Entities:");
    for entity in EntityKind::ALL {
        println!("  {:<22} {}", entity.as_str(), entities.count(entity)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!(
        "Opening dump metadata database at {:?}...",
        config.catalog_db_path()
    );
    let metadata_store = Arc::new(SqliteDumpMetadataStore::new(config.catalog_db_path())?);
    let catalog = Arc::new(DumpCatalog::new(metadata_store));

    match cli_args.command {
        CliCommand::Refresh => {
            let source = build_source(&config)?;
            refresh(&catalog, source.as_ref()).await;
        }
        CliCommand::Import { force, refresh: refresh_first, .. } => {
            let source = build_source(&config)?;
            if refresh_first {
                refresh(&catalog, source.as_ref()).await;
            }

            info!("Opening entity database at {:?}...", config.entity_db_path());
            let entities = Arc::new(SqliteEntityStore::new(config.entity_db_path())?);

            let cancel = CancellationToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                info!("Interrupted, stopping after the batch in flight");
                handler_token.cancel();
            })
            .context("Failed to install interrupt handler")?;

            let orchestrator =
                ImportOrchestrator::new(catalog, source, entities, config.import_config(force));
            let report = orchestrator.run(cancel).await;
            for summary in &report.types {
                info!("{}", serde_json::to_string(summary)?);
            }
            if let Some(e) = report.error {
                match report.failed_type {
                    Some(dump_type) => {
                        bail!("Import ended {} while importing {}: {}", report.state, dump_type, e)
                    }
                    None => bail!("Import ended {}: {}", report.state, e),
                }
            }
        }
        CliCommand::Status => {
            let entities = SqliteEntityStore::new(config.entity_db_path())?;
            print_status(&config, &catalog, &entities)?;
        }
    }

    Ok(())
}
