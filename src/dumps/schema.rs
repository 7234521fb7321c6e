//! Database schema for catalog.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 0
// =============================================================================

const DUMP_RECORDS_TABLE_V0: Table = Table {
    name: "dump_records",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("fingerprint", &SqlType::Text, non_null = true),
        sqlite_column!("dump_type", &SqlType::Text, non_null = true),
        // ISO 8601 date, so lexical order is chronological
        sqlite_column!("published_on", &SqlType::Text, non_null = true),
        sqlite_column!("locator", &SqlType::Text, non_null = true),
        sqlite_column!(
            "discovered_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_dump_records_type_published", "dump_type, published_on")],
    unique_constraints: &[&["fingerprint"]],
};

// =============================================================================
// Version 1 - import completion tracking
// =============================================================================

const DUMP_RECORDS_TABLE_V1: Table = Table {
    name: "dump_records",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("fingerprint", &SqlType::Text, non_null = true),
        sqlite_column!("dump_type", &SqlType::Text, non_null = true),
        sqlite_column!("published_on", &SqlType::Text, non_null = true),
        sqlite_column!("locator", &SqlType::Text, non_null = true),
        sqlite_column!(
            "discovered_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("imported_at", &SqlType::Integer),
    ],
    indices: &[("idx_dump_records_type_published", "dump_type, published_on")],
    unique_constraints: &[&["fingerprint"]],
};

fn add_imported_at(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE dump_records ADD COLUMN imported_at INTEGER", [])?;
    Ok(())
}

pub const DUMP_METADATA_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[DUMP_RECORDS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[DUMP_RECORDS_TABLE_V1],
        migration: Some(add_imported_at),
    },
];
