//! Discogs Dump Importer Library
//!
//! Tracks published Discogs data dumps and imports the newest complete set
//! into a relational store. This library exposes the internal modules for
//! testing and reuse by the `discogs-importer` binary.

pub mod config;
pub mod dumps;
pub mod entity_store;
pub mod error;
pub mod import;
pub mod records;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use dumps::{DumpCatalog, DumpSource, DumpType};
pub use entity_store::{EntityStore, SqliteEntityStore};
pub use error::ImportError;
pub use import::{ImportConfig, ImportOrchestrator, ImportReport, ImportState};
