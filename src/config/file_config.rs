use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub target: Option<String>,

    // Dump source, one of the two
    pub source_url: Option<String>,
    pub source_dir: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Import pipeline
    pub batch_size: Option<usize>,
    pub queue_capacity: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
