use super::dump_type::DumpType;
use super::models::DumpMetadata;
use super::source::{decompress_if_needed, parse_dump_file_name, DumpSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Dumps already downloaded into a local directory.
pub struct LocalDumpSource {
    dir: PathBuf,
}

impl LocalDumpSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn newest_file(dir: &Path, dump_type: DumpType) -> Result<Option<(PathBuf, chrono::NaiveDate)>> {
        let mut newest: Option<(PathBuf, chrono::NaiveDate)> = None;
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("Failed to read dump dir {:?}", dir))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(parsed) = parse_dump_file_name(&name.to_string_lossy()) else {
                continue;
            };
            if parsed.dump_type != dump_type {
                continue;
            }
            let is_newer = newest
                .as_ref()
                .map_or(true, |(_, date)| parsed.published_on > *date);
            if is_newer {
                newest = Some((entry.path(), parsed.published_on));
            }
        }
        Ok(newest)
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_fingerprint(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl DumpSource for LocalDumpSource {
    async fn fetch_metadata(&self, dump_type: DumpType) -> Result<DumpMetadata> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let (path, published_on) = Self::newest_file(&dir, dump_type)?
                .with_context(|| format!("No {} dump found in {:?}", dump_type, dir))?;
            let fingerprint = file_fingerprint(&path)?;
            Ok::<_, anyhow::Error>(DumpMetadata {
                dump_type,
                fingerprint,
                published_on,
                locator: path.to_string_lossy().to_string(),
            })
        })
        .await
        .context("Dump scan task panicked")?
    }

    fn open_stream(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(locator).with_context(|| format!("Failed to open dump {}", locator))?;
        Ok(decompress_if_needed(locator, Box::new(file)))
    }
}
