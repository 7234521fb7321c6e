//! In-memory dump source and on-disk test environment.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use discogs_importer::dumps::{
    DumpCatalog, DumpMetadata, DumpSource, DumpType, RefreshReport, SqliteDumpMetadataStore,
};
use discogs_importer::entity_store::{BatchReceipt, EntityStore, PersistError, SqliteEntityStore};
use discogs_importer::import::{ImportConfig, ImportOrchestrator};
use discogs_importer::records::{Command, EntityKind};
use rusqlite::types::Value;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct PublishedDump {
    metadata: DumpMetadata,
    xml: String,
    fail_after: Option<usize>,
}

/// A dump source serving XML held in memory.
///
/// Only the most recently published dump of each type is listed, so older
/// periods are known only if a refresh saw them while they were newest.
#[derive(Default)]
pub struct FixtureSource {
    dumps: Mutex<HashMap<String, PublishedDump>>,
    latest: Mutex<HashMap<DumpType, String>>,
}

impl FixtureSource {
    pub fn publish(&self, dump_type: DumpType, published_on: &str, xml: &str) -> String {
        self.publish_inner(dump_type, published_on, xml, None)
    }

    /// Publishes a dump whose stream breaks after `fail_after` bytes.
    pub fn publish_broken(
        &self,
        dump_type: DumpType,
        published_on: &str,
        xml: &str,
        fail_after: usize,
    ) -> String {
        self.publish_inner(dump_type, published_on, xml, Some(fail_after))
    }

    fn publish_inner(
        &self,
        dump_type: DumpType,
        published_on: &str,
        xml: &str,
        fail_after: Option<usize>,
    ) -> String {
        let published_on = NaiveDate::parse_from_str(published_on, "%Y-%m-%d").unwrap();
        let mut hasher = Sha256::new();
        hasher.update(published_on.to_string());
        hasher.update(xml);
        let fingerprint = format!("{:x}", hasher.finalize());
        let locator = format!(
            "mem://discogs_{}_{}.xml",
            published_on.format("%Y%m%d"),
            dump_type.file_stem()
        );

        let metadata = DumpMetadata {
            dump_type,
            fingerprint: fingerprint.clone(),
            published_on,
            locator: locator.clone(),
        };
        self.dumps.lock().unwrap().insert(
            locator.clone(),
            PublishedDump {
                metadata,
                xml: xml.to_string(),
                fail_after,
            },
        );
        self.latest.lock().unwrap().insert(dump_type, locator);
        fingerprint
    }
}

#[async_trait]
impl DumpSource for FixtureSource {
    async fn fetch_metadata(&self, dump_type: DumpType) -> Result<DumpMetadata> {
        let latest = self.latest.lock().unwrap();
        let locator = latest
            .get(&dump_type)
            .ok_or_else(|| anyhow!("Nothing published for {}", dump_type))?;
        let dumps = self.dumps.lock().unwrap();
        Ok(dumps[locator].metadata.clone())
    }

    fn open_stream(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
        let dumps = self.dumps.lock().unwrap();
        let Some(dump) = dumps.get(locator) else {
            bail!("No dump at {}", locator);
        };
        let bytes = dump.xml.clone().into_bytes();
        Ok(match dump.fail_after {
            Some(limit) => Box::new(BreakingReader {
                bytes,
                position: 0,
                limit,
            }),
            None => Box::new(io::Cursor::new(bytes)),
        })
    }
}

/// Reads up to `limit` bytes, then fails like a dropped connection.
struct BreakingReader {
    bytes: Vec<u8>,
    position: usize,
    limit: usize,
}

impl Read for BreakingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.limit {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let end = self.limit.min(self.bytes.len()).min(self.position + buf.len());
        let n = end - self.position;
        buf[..n].copy_from_slice(&self.bytes[self.position..end]);
        self.position = end;
        Ok(n)
    }
}

/// Entity store that cancels `cancel` right after committing the first batch
/// holding a `trigger` command.
pub struct CancellingStore {
    pub inner: Arc<SqliteEntityStore>,
    pub cancel: CancellationToken,
    pub trigger: EntityKind,
}

impl EntityStore for CancellingStore {
    fn apply_batch(&self, commands: &[Command]) -> Result<BatchReceipt, PersistError> {
        let receipt = self.inner.apply_batch(commands)?;
        if commands.iter().any(|c| c.entity() == self.trigger) {
            self.cancel.cancel();
        }
        Ok(receipt)
    }

    fn count(&self, entity: EntityKind) -> Result<usize> {
        self.inner.count(entity)
    }
}

/// Entity store rejecting every batch holding a `failing` command.
pub struct FailingStore {
    pub inner: Arc<SqliteEntityStore>,
    pub failing: EntityKind,
}

impl EntityStore for FailingStore {
    fn apply_batch(&self, commands: &[Command]) -> Result<BatchReceipt, PersistError> {
        if commands.iter().any(|c| c.entity() == self.failing) {
            return Err(PersistError::Conflict {
                entity: self.failing,
                message: "database is locked".to_string(),
            });
        }
        self.inner.apply_batch(commands)
    }

    fn count(&self, entity: EntityKind) -> Result<usize> {
        self.inner.count(entity)
    }
}

/// Catalog and entity databases in a temporary directory, fed by a
/// [`FixtureSource`].
pub struct TestEnv {
    pub dir: TempDir,
    pub source: Arc<FixtureSource>,
    pub catalog: Arc<DumpCatalog>,
    pub entities: Arc<SqliteEntityStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let metadata_store = SqliteDumpMetadataStore::new(dir.path().join("catalog.db")).unwrap();
        let entities = SqliteEntityStore::new(dir.path().join("discogs.db")).unwrap();
        Self {
            dir,
            source: Arc::new(FixtureSource::default()),
            catalog: Arc::new(DumpCatalog::new(Arc::new(metadata_store))),
            entities: Arc::new(entities),
        }
    }

    pub fn entity_db_path(&self) -> PathBuf {
        self.dir.path().join("discogs.db")
    }

    pub async fn refresh(&self) -> RefreshReport {
        self.catalog.refresh(self.source.as_ref()).await
    }

    /// Publishes a full ARTIST, LABEL, MASTER and RELEASE set on `date`.
    pub fn publish_full_set(&self, date: &str) {
        self.source.publish(DumpType::Artist, date, super::ARTISTS_XML);
        self.source.publish(DumpType::Label, date, super::LABELS_XML);
        self.source.publish(DumpType::Master, date, super::MASTERS_XML);
        self.source.publish(DumpType::Release, date, super::RELEASES_XML);
    }

    pub fn config(&self, target: DumpType) -> ImportConfig {
        ImportConfig {
            target,
            batch_size: 2,
            queue_capacity: 8,
            force: false,
        }
    }

    pub fn orchestrator(&self, config: ImportConfig) -> ImportOrchestrator {
        self.orchestrator_with_store(self.entities.clone(), config)
    }

    pub fn orchestrator_with_store(
        &self,
        entities: Arc<dyn EntityStore>,
        config: ImportConfig,
    ) -> ImportOrchestrator {
        ImportOrchestrator::new(self.catalog.clone(), self.source.clone(), entities, config)
    }

    pub fn count(&self, entity: EntityKind) -> usize {
        self.entities.count(entity).unwrap()
    }

    /// Reads a single value straight from the entity database.
    pub fn query_value(&self, sql: &str) -> Value {
        let conn = Connection::open(self.entity_db_path()).unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}
