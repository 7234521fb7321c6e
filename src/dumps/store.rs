use super::dump_type::DumpType;
use super::models::{DumpRecord, Period};
use super::schema::DUMP_METADATA_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

const RECORD_COLUMNS: &str =
    "dump_type, fingerprint, published_on, locator, discovered_at, imported_at";

/// Persistence for known dumps, keyed by fingerprint.
pub trait DumpMetadataStore: Send + Sync {
    fn exists(&self, fingerprint: &str) -> Result<bool>;

    /// Inserts `record` unless its fingerprint is already present.
    /// Returns true if a row was inserted.
    fn insert_if_absent(&self, record: &DumpRecord) -> Result<bool>;

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DumpRecord>>;

    /// Most recently published dump of a type across all periods.
    fn find_latest(&self, dump_type: DumpType) -> Result<Option<DumpRecord>>;

    fn find_latest_in_period(
        &self,
        dump_type: DumpType,
        period: Period,
    ) -> Result<Option<DumpRecord>>;

    /// All dumps of `types` published in `period`, newest first.
    fn find_all_in_period(&self, types: &[DumpType], period: Period) -> Result<Vec<DumpRecord>>;

    /// Number of distinct `types` having at least one dump in `period`.
    fn count_in_period(&self, types: &[DumpType], period: Period) -> Result<usize>;

    /// Distinct periods holding any dump, newest first.
    fn list_periods(&self) -> Result<Vec<Period>>;

    /// Sets the import time. Returns false if the fingerprint is unknown.
    fn mark_imported(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<bool>;
}

pub struct SqliteDumpMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDumpMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open catalog db at {:?}", db_path.as_ref()))?;
        open_versioned(&mut conn, DUMP_METADATA_VERSIONED_SCHEMAS, "catalog")?;
        info!("Opened dump catalog at {:?}", db_path.as_ref());
        Ok(SqliteDumpMetadataStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, DUMP_METADATA_VERSIONED_SCHEMAS, "catalog")?;
        Ok(SqliteDumpMetadataStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DumpRecord> {
        let dump_type = row.get::<_, String>(0)?;
        let dump_type = DumpType::parse(&dump_type)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let published_on = row.get::<_, String>(2)?;
        let published_on = NaiveDate::parse_from_str(&published_on, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
        Ok(DumpRecord {
            dump_type,
            fingerprint: row.get(1)?,
            published_on,
            locator: row.get(3)?,
            discovered_at: timestamp_to_datetime(row.get(4)?),
            imported_at: row.get::<_, Option<i64>>(5)?.map(timestamp_to_datetime),
        })
    }

    fn type_placeholders(types: &[DumpType], first_index: usize) -> String {
        (0..types.len())
            .map(|i| format!("?{}", first_index + i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn period_bounds(period: Period) -> (String, String) {
    (
        period.first_day().format(DATE_FORMAT).to_string(),
        period.next_first_day().format(DATE_FORMAT).to_string(),
    )
}

impl DumpMetadataStore for SqliteDumpMetadataStore {
    fn exists(&self, fingerprint: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM dump_records WHERE fingerprint = ?1",
                params![fingerprint],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_if_absent(&self, record: &DumpRecord) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO dump_records (dump_type, fingerprint, published_on, locator, discovered_at, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fingerprint) DO NOTHING",
                params![
                    record.dump_type.as_str(),
                    record.fingerprint,
                    record.published_on.format(DATE_FORMAT).to_string(),
                    record.locator,
                    record.discovered_at.timestamp(),
                    record.imported_at.map(|t| t.timestamp()),
                ],
            )
            .with_context(|| format!("Failed to insert dump record {}", record.fingerprint))?;
        Ok(inserted > 0)
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DumpRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM dump_records WHERE fingerprint = ?1",
                    RECORD_COLUMNS
                ),
                params![fingerprint],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_latest(&self, dump_type: DumpType) -> Result<Option<DumpRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM dump_records WHERE dump_type = ?1
                     ORDER BY published_on DESC, discovered_at DESC, id DESC LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![dump_type.as_str()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_latest_in_period(
        &self,
        dump_type: DumpType,
        period: Period,
    ) -> Result<Option<DumpRecord>> {
        let (start, end) = period_bounds(period);
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM dump_records
                     WHERE dump_type = ?1 AND published_on >= ?2 AND published_on < ?3
                     ORDER BY published_on DESC, discovered_at DESC, id DESC LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![dump_type.as_str(), start, end],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_all_in_period(&self, types: &[DumpType], period: Period) -> Result<Vec<DumpRecord>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let (start, end) = period_bounds(period);
        let sql = format!(
            "SELECT {} FROM dump_records
             WHERE published_on >= ?1 AND published_on < ?2 AND dump_type IN ({})
             ORDER BY published_on DESC, discovered_at DESC, id DESC",
            RECORD_COLUMNS,
            Self::type_placeholders(types, 3)
        );
        let bindings: Vec<String> = [start, end]
            .into_iter()
            .chain(types.iter().map(|t| t.as_str().to_string()))
            .collect();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(bindings.iter()), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn count_in_period(&self, types: &[DumpType], period: Period) -> Result<usize> {
        if types.is_empty() {
            return Ok(0);
        }
        let (start, end) = period_bounds(period);
        let sql = format!(
            "SELECT COUNT(DISTINCT dump_type) FROM dump_records
             WHERE published_on >= ?1 AND published_on < ?2 AND dump_type IN ({})",
            Self::type_placeholders(types, 3)
        );
        let bindings: Vec<String> = [start, end]
            .into_iter()
            .chain(types.iter().map(|t| t.as_str().to_string()))
            .collect();

        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(&sql, params_from_iter(bindings.iter()), |r| r.get(0))?;
        Ok(count as usize)
    }

    fn list_periods(&self) -> Result<Vec<Period>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT substr(published_on, 1, 7) AS period FROM dump_records ORDER BY period DESC",
        )?;
        let raw: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        raw.iter()
            .map(|p| {
                Period::parse(p).with_context(|| format!("Corrupt published_on prefix '{}'", p))
            })
            .collect()
    }

    fn mark_imported(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE dump_records SET imported_at = ?1 WHERE fingerprint = ?2",
            params![at.timestamp(), fingerprint],
        )?;
        Ok(updated > 0)
    }
}
