use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

pub const BASE_DB_VERSION: usize = 99999;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }

    fn from_sql(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            _ => None,
        }
    }
}

pub struct Column<'a> {
    pub name: &'a str,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<&'a str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create_sql(&self) -> String {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }
        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        create_sql
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;
        for (index_name, column_names) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_names
                ),
                params![],
            )?;
        }
        Ok(())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: String,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<ActualColumn> = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if SqlType::from_sql(&actual.sql_type) != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null || actual.is_primary_key != expected.is_primary_key
            {
                bail!(
                    "Table {} column {} constraint mismatch (non_null: {}, primary_key: {})",
                    self.name,
                    expected.name,
                    actual.non_null,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _) in self.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }

        if !self.unique_constraints.is_empty() {
            let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
            let unique_indices: Vec<String> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
                .filter_map(|r| r.ok())
                .filter(|(_, is_unique)| *is_unique == 1)
                .map(|(name, _)| name)
                .collect();

            let mut unique_index_columns: Vec<Vec<String>> = Vec::new();
            for index_name in &unique_indices {
                let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
                let mut cols: Vec<String> = idx_stmt
                    .query_map([], |row| row.get::<_, String>(2))?
                    .filter_map(|r| r.ok())
                    .collect();
                cols.sort();
                unique_index_columns.push(cols);
            }

            for expected_columns in self.unique_constraints {
                let mut expected_sorted: Vec<&str> = expected_columns.to_vec();
                expected_sorted.sort();
                let found = unique_index_columns
                    .iter()
                    .any(|actual| actual.iter().map(|s| s.as_str()).eq(expected_sorted.iter().copied()));
                if !found {
                    bail!(
                        "Table {} is missing unique constraint on columns ({})",
                        self.name,
                        expected_columns.join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", BASE_DB_VERSION + self.version)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Brings `conn` to the latest of `schemas`: creates a fresh database,
/// or validates the stored version and runs pending migrations.
pub fn open_versioned(conn: &mut Connection, schemas: &[VersionedSchema], label: &str) -> Result<()> {
    let latest = schemas.last().context("No schemas defined")?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        info!("Creating {} db schema at version {}", label, latest.version);
        let tx = conn.transaction()?;
        latest.create(&tx)?;
        tx.commit()?;
        return Ok(());
    }

    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let version = db_version - BASE_DB_VERSION as i64;
    if version < 0 {
        bail!(
            "{} database version {} does not contain base db version {}",
            label,
            db_version,
            BASE_DB_VERSION
        );
    }
    let version = version as usize;
    let current = schemas
        .iter()
        .find(|s| s.version == version)
        .with_context(|| format!("{} database version {} is not supported", label, version))?;
    current.validate(conn)?;

    if version >= latest.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in schemas.iter().filter(|s| s.version > version) {
        if let Some(migration_fn) = schema.migration {
            info!("Migrating {} db to version {}", label, schema.version);
            migration_fn(&tx)?;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + latest.version)?;
    tx.commit()?;
    Ok(())
}
