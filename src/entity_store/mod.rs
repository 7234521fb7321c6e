//! Relational store for converted dump entities.

mod schema;
mod store;

pub use schema::{natural_key, table_for, ENTITY_VERSIONED_SCHEMAS};
pub use store::{BatchReceipt, EntityStore, PersistError, SqliteEntityStore};
