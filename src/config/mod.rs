mod file_config;

pub use file_config::FileConfig;

use crate::dumps::{DumpType, DEFAULT_BUCKET_URL};
use crate::import::ImportConfig;
use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 60;

pub fn default_user_agent() -> String {
    format!("discogs-importer/{}", env!("CARGO_PKG_VERSION"))
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub source_url: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub target: Option<DumpType>,
    pub batch_size: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub user_agent: Option<String>,
    pub request_timeout_sec: Option<u64>,
}

/// Where dumps are listed and read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSettings {
    /// S3-style bucket listing, downloaded over HTTP.
    Remote { base_url: String },
    /// A directory of dump files named like the published ones.
    Local { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub source: SourceSettings,
    pub target: DumpType,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub user_agent: String,
    pub request_timeout_sec: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let source_url = file.source_url.or_else(|| cli.source_url.clone());
        let source_dir = file
            .source_dir
            .map(PathBuf::from)
            .or_else(|| cli.source_dir.clone());
        let source = match (source_url, source_dir) {
            (Some(_), Some(_)) => {
                bail!("Only one of source_url and source_dir can be specified")
            }
            (None, Some(dir)) => {
                if !dir.is_dir() {
                    bail!("source_dir is not a directory: {:?}", dir);
                }
                SourceSettings::Local { dir }
            }
            (url, None) => SourceSettings::Remote {
                base_url: url
                    .unwrap_or_else(|| DEFAULT_BUCKET_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
        };

        let target = match file.target {
            Some(name) => DumpType::parse(&name)?,
            None => cli.target.unwrap_or(DumpType::Release),
        };

        let batch_size = file
            .batch_size
            .or(cli.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        let queue_capacity = file
            .queue_capacity
            .or(cli.queue_capacity)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            bail!("queue_capacity must be greater than zero");
        }

        let user_agent = file
            .user_agent
            .or_else(|| cli.user_agent.clone())
            .unwrap_or_else(default_user_agent);
        let request_timeout_sec = file
            .request_timeout_sec
            .or(cli.request_timeout_sec)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SEC);

        Ok(Self {
            db_dir,
            source,
            target,
            batch_size,
            queue_capacity,
            user_agent,
            request_timeout_sec,
        })
    }

    /// Dump metadata: what was published and what was imported.
    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    /// Imported entities.
    pub fn entity_db_path(&self) -> PathBuf {
        self.db_dir.join("discogs.db")
    }

    pub fn import_config(&self, force: bool) -> ImportConfig {
        ImportConfig {
            target: self.target,
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity,
            force,
        }
    }
}
