use super::schema::{natural_key, table_for, ENTITY_VERSIONED_SCHEMAS};
use crate::records::{Command, EntityKind, FieldValue};
use crate::sqlite_persistence::{open_versioned, DEFAULT_TIMESTAMP};
use anyhow::{Context, Result};
use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::{params_from_iter, Connection, ErrorCode, ToSql};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

const AUDIT_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Conflict writing {entity}: {message}")]
    Conflict { entity: EntityKind, message: String },

    #[error("Invalid {entity} command: {message}")]
    Validation { entity: EntityKind, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub commands: usize,
    /// Rows inserted or actually modified. Unchanged rows are not touched.
    pub rows_changed: usize,
}

/// Destination of converted commands.
pub trait EntityStore: Send + Sync {
    /// Applies all commands in one transaction: either every command is
    /// persisted or none is.
    fn apply_batch(&self, commands: &[Command]) -> Result<BatchReceipt, PersistError>;

    fn count(&self, entity: EntityKind) -> Result<usize>;
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Text(text) => ToSqlOutput::from(text.as_str()),
            FieldValue::Integer(value) => ToSqlOutput::from(*value),
            FieldValue::Absent => ToSqlOutput::from(Null),
        })
    }
}

/// Builds the upsert for `command` and the values to bind, in order.
///
/// Absent attributes are left out entirely so a re-import never blanks a
/// column. On conflict only differing columns are written, so reapplying an
/// unchanged command changes nothing, `updated_at` included.
fn upsert_statement(command: &Command) -> Result<(String, Vec<&FieldValue>), PersistError> {
    let entity = command.entity();
    let invalid = |message: String| PersistError::Validation { entity, message };
    let table = table_for(entity);
    let key_columns = natural_key(table);

    let command_key: Vec<&str> = command.key().iter().map(|(c, _)| *c).collect();
    if command_key != key_columns {
        return Err(invalid(format!(
            "key ({}) does not match natural key ({})",
            command_key.join(", "),
            key_columns.join(", ")
        )));
    }

    let mut columns: Vec<&str> = command_key;
    let mut values: Vec<&FieldValue> = command.key().iter().map(|(_, v)| v).collect();
    let mut updated: Vec<&str> = Vec::new();
    for (column, value) in command.fields() {
        if !table.has_column(column) || AUDIT_COLUMNS.contains(column) {
            return Err(invalid(format!("unknown column '{}'", column)));
        }
        if columns.contains(column) {
            return Err(invalid(format!("column '{}' given twice", column)));
        }
        if value.is_absent() {
            continue;
        }
        columns.push(*column);
        values.push(value);
        updated.push(*column);
    }

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) ",
        table.name,
        columns.join(", "),
        placeholders.join(", "),
        key_columns.join(", ")
    );
    if updated.is_empty() {
        sql.push_str("DO NOTHING");
    } else {
        let assignments: Vec<String> = updated
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let changed: Vec<String> = updated
            .iter()
            .map(|c| format!("{}.{c} IS NOT excluded.{c}", table.name))
            .collect();
        sql.push_str(&format!(
            "DO UPDATE SET {}, updated_at = {} WHERE {}",
            assignments.join(", "),
            DEFAULT_TIMESTAMP,
            changed.join(" OR ")
        ));
    }
    Ok((sql, values))
}

/// Deletes the children of `command` that its latest conversion no longer
/// produced, one statement per child kind.
fn prune_statements(
    command: &Command,
) -> Result<Vec<(EntityKind, String, Vec<&FieldValue>)>, PersistError> {
    if command.child_scopes().is_empty() {
        return Ok(Vec::new());
    }
    let entity = command.entity();
    let [(_, owner_id)] = command.key() else {
        return Err(PersistError::Validation {
            entity,
            message: "children can only be scoped to a single-column key".to_string(),
        });
    };

    let mut statements = Vec::with_capacity(command.child_scopes().len());
    for scope in command.child_scopes() {
        let table = table_for(scope.entity);
        let retained_column = match natural_key(table) {
            [owner, retained] if *owner == scope.owner_column => *retained,
            _ => {
                return Err(PersistError::Validation {
                    entity: scope.entity,
                    message: format!("cannot scope children by '{}'", scope.owner_column),
                })
            }
        };

        let mut sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            table.name, scope.owner_column
        );
        let mut values = vec![owner_id];
        if !scope.retained.is_empty() {
            let placeholders: Vec<String> = (2..=scope.retained.len() + 1)
                .map(|i| format!("?{}", i))
                .collect();
            sql.push_str(&format!(
                " AND {} NOT IN ({})",
                retained_column,
                placeholders.join(", ")
            ));
            values.extend(scope.retained.iter());
        }
        statements.push((scope.entity, sql, values));
    }
    Ok(statements)
}

fn map_sqlite_error(entity: EntityKind, err: rusqlite::Error) -> PersistError {
    if let rusqlite::Error::SqliteFailure(e, message) = &err {
        if e.code == ErrorCode::ConstraintViolation {
            return PersistError::Conflict {
                entity,
                message: message.clone().unwrap_or_else(|| e.to_string()),
            };
        }
    }
    PersistError::Storage(anyhow::Error::from(err).context(format!("Failed to write {}", entity)))
}

pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open entity db at {:?}", db_path.as_ref()))?;
        open_versioned(&mut conn, ENTITY_VERSIONED_SCHEMAS, "entity")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.set_prepared_statement_cache_capacity(128);
        info!("Opened entity database at {:?}", db_path.as_ref());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, ENTITY_VERSIONED_SCHEMAS, "entity")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl EntityStore for SqliteEntityStore {
    fn apply_batch(&self, commands: &[Command]) -> Result<BatchReceipt, PersistError> {
        if commands.is_empty() {
            return Ok(BatchReceipt::default());
        }
        let mut statements = Vec::with_capacity(commands.len());
        for command in commands {
            let (sql, values) = upsert_statement(command)?;
            statements.push((command.entity(), sql, values));
            statements.extend(prune_statements(command)?);
        }

        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])
            .context("Failed to begin batch transaction")?;

        let result = (|| -> Result<usize, PersistError> {
            let mut rows_changed = 0;
            for (entity, sql, values) in &statements {
                let mut stmt = conn
                    .prepare_cached(sql)
                    .map_err(|e| map_sqlite_error(*entity, e))?;
                rows_changed += stmt
                    .execute(params_from_iter(values.iter()))
                    .map_err(|e| map_sqlite_error(*entity, e))?;
            }
            Ok(rows_changed)
        })();

        match result {
            Ok(rows_changed) => {
                conn.execute("COMMIT", [])
                    .context("Failed to commit batch")?;
                Ok(BatchReceipt {
                    commands: commands.len(),
                    rows_changed,
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    fn count(&self, entity: EntityKind) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table_for(entity).name),
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(id: i64, name: &str, profile: &str) -> Command {
        Command::builder(EntityKind::Artist)
            .key("id", FieldValue::from(id))
            .field("name", FieldValue::text(Some(name)))
            .field("profile", FieldValue::text(Some(profile)))
            .build()
            .unwrap()
    }

    fn artist_row(store: &SqliteEntityStore, id: i64) -> (Option<String>, Option<String>) {
        let conn = store.conn.lock().unwrap();
        conn.query_row(
            "SELECT name, profile FROM artist WHERE id = ?1",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let store = SqliteEntityStore::in_memory().unwrap();
        let receipt = store.apply_batch(&[artist(1, "A", "first")]).unwrap();
        assert_eq!(receipt.rows_changed, 1);

        store.apply_batch(&[artist(1, "A", "second")]).unwrap();
        assert_eq!(store.count(EntityKind::Artist).unwrap(), 1);
        assert_eq!(
            artist_row(&store, 1),
            (Some("A".to_string()), Some("second".to_string()))
        );
    }

    #[test]
    fn reapplying_unchanged_batch_changes_nothing() {
        let store = SqliteEntityStore::in_memory().unwrap();
        let batch = vec![artist(1, "A", "p"), artist(2, "B", "q")];
        assert_eq!(store.apply_batch(&batch).unwrap().rows_changed, 2);

        let receipt = store.apply_batch(&batch).unwrap();
        assert_eq!(receipt.commands, 2);
        assert_eq!(receipt.rows_changed, 0);
        assert_eq!(store.count(EntityKind::Artist).unwrap(), 2);
    }

    #[test]
    fn absent_fields_do_not_overwrite() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&[artist(1, "A", "kept")]).unwrap();
        store.apply_batch(&[artist(1, "A", "   ")]).unwrap();
        assert_eq!(artist_row(&store, 1).1, Some("kept".to_string()));
    }

    #[test]
    fn absent_fields_are_null_on_insert() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&[artist(5, "Blank", "")]).unwrap();
        assert_eq!(artist_row(&store, 5), (Some("Blank".to_string()), None));
    }

    #[test]
    fn child_rows_are_unique_per_natural_key() {
        let store = SqliteEntityStore::in_memory().unwrap();
        let owner = artist(1, "A", "p");
        let url = |u: &str| {
            Command::child_of(&owner, EntityKind::ArtistUrl, "artist_id")
                .key("url", FieldValue::text(Some(u)))
                .build()
                .unwrap()
        };
        let batch = vec![owner.clone(), url("http://a"), url("http://b"), url("http://a")];
        let receipt = store.apply_batch(&batch).unwrap();
        assert_eq!(receipt.rows_changed, 3);
        assert_eq!(store.count(EntityKind::ArtistUrl).unwrap(), 2);
    }

    #[test]
    fn wrong_key_is_a_validation_error_and_nothing_is_written() {
        let store = SqliteEntityStore::in_memory().unwrap();
        let bad = Command::builder(EntityKind::Label)
            .key("name", FieldValue::text(Some("Svek")))
            .build()
            .unwrap();
        let err = store.apply_batch(&[artist(1, "A", "p"), bad]).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Validation {
                entity: EntityKind::Label,
                ..
            }
        ));
        assert_eq!(store.count(EntityKind::Artist).unwrap(), 0);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let store = SqliteEntityStore::in_memory().unwrap();
        let bad = Command::builder(EntityKind::Artist)
            .key("id", FieldValue::from(1))
            .field("shoe_size", FieldValue::from(44))
            .build()
            .unwrap();
        assert!(matches!(
            store.apply_batch(&[bad]),
            Err(PersistError::Validation { .. })
        ));
    }

    #[test]
    fn failing_statement_rolls_back_whole_batch() {
        let store = SqliteEntityStore::in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_label BEFORE INSERT ON label
                 WHEN NEW.id = 666 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }
        let label = |id: i64| {
            Command::builder(EntityKind::Label)
                .key("id", FieldValue::from(id))
                .field("name", FieldValue::text(Some("L")))
                .build()
                .unwrap()
        };

        let err = store.apply_batch(&[label(1), label(666)]).unwrap_err();
        assert!(matches!(err, PersistError::Conflict { .. }));
        assert_eq!(store.count(EntityKind::Label).unwrap(), 0);

        store.apply_batch(&[label(1)]).unwrap();
        assert_eq!(store.count(EntityKind::Label).unwrap(), 1);
    }

    #[test]
    fn upsert_sql_shape() {
        let command = artist(1, "A", "");
        let (sql, values) = upsert_statement(&command).unwrap();
        assert_eq!(
            sql,
            format!(
                "INSERT INTO artist (id, name) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = {} WHERE artist.name IS NOT excluded.name",
                DEFAULT_TIMESTAMP
            )
        );
        assert_eq!(values.len(), 2);
    }

    fn release(xml: &str) -> Vec<Command> {
        use crate::dumps::DumpType;
        use crate::records::{convert_record, ElementStream};
        let element = ElementStream::new(xml.as_bytes()).next().unwrap().unwrap();
        convert_record(DumpType::Release, &element).unwrap()
    }

    const RELEASE_V1: &str = r#"<releases><release id="1"><title>Three</title>
        <genres><genre>Jazz</genre></genres>
        <tracklist><track><title>A</title></track><track><title>B</title></track><track><title>C</title></track></tracklist>
    </release></releases>"#;

    const RELEASE_V2: &str = r#"<releases><release id="1"><title>Three</title>
        <genres><genre>Rock</genre></genres>
        <tracklist><track><title>A</title></track><track><title>B</title></track></tracklist>
    </release></releases>"#;

    #[test]
    fn newer_record_prunes_dropped_children() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&release(RELEASE_V1)).unwrap();
        assert_eq!(store.count(EntityKind::ReleaseTrack).unwrap(), 3);

        let receipt = store.apply_batch(&release(RELEASE_V2)).unwrap();
        // Track 3 and Jazz removed, Rock inserted.
        assert_eq!(receipt.rows_changed, 3);
        assert_eq!(store.count(EntityKind::ReleaseTrack).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ReleaseGenre).unwrap(), 1);
        let conn = store.conn.lock().unwrap();
        let genre: String = conn
            .query_row("SELECT genre FROM release_genre WHERE release_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(genre, "Rock");
    }

    #[test]
    fn pruning_spans_batches() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&release(RELEASE_V1)).unwrap();

        let commands = release(RELEASE_V2);
        let (primary, children) = commands.split_first().unwrap();
        store.apply_batch(std::slice::from_ref(primary)).unwrap();
        store.apply_batch(children).unwrap();
        assert_eq!(store.count(EntityKind::ReleaseTrack).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ReleaseGenre).unwrap(), 1);
    }

    #[test]
    fn unchanged_record_prunes_nothing() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&release(RELEASE_V1)).unwrap();
        let receipt = store.apply_batch(&release(RELEASE_V1)).unwrap();
        assert_eq!(receipt.rows_changed, 0);
        assert_eq!(store.count(EntityKind::ReleaseTrack).unwrap(), 3);
    }

    #[test]
    fn pruning_leaves_other_owners_alone() {
        let store = SqliteEntityStore::in_memory().unwrap();
        store.apply_batch(&release(RELEASE_V1)).unwrap();
        store
            .apply_batch(&release(&RELEASE_V1.replace(r#"id="1""#, r#"id="2""#)))
            .unwrap();
        store.apply_batch(&release(RELEASE_V2)).unwrap();
        assert_eq!(store.count(EntityKind::ReleaseTrack).unwrap(), 5);
    }

    #[test]
    fn every_child_kind_is_prunable() {
        for owner in [
            EntityKind::Artist,
            EntityKind::Label,
            EntityKind::Master,
            EntityKind::Release,
        ] {
            let mut command = Command::builder(owner)
                .key("id", FieldValue::from(1))
                .build()
                .unwrap();
            command.set_child_scopes(
                owner
                    .child_kinds()
                    .iter()
                    .map(|(entity, owner_column)| crate::records::ChildScope {
                        entity: *entity,
                        owner_column: *owner_column,
                        retained: Vec::new(),
                    })
                    .collect(),
            );
            let statements = prune_statements(&command).unwrap();
            assert_eq!(statements.len(), owner.child_kinds().len());
        }
    }
}
