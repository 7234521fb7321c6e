//! Dump registry, catalog and sources.

mod catalog;
mod dump_type;
mod local_source;
mod models;
mod s3_source;
mod schema;
mod source;
mod store;

pub use catalog::{DiscoveredDump, DumpCatalog, RefreshFailure, RefreshReport};
pub use dump_type::{import_order, DumpType};
pub use local_source::{file_fingerprint, LocalDumpSource};
pub use models::{DumpMetadata, DumpRecord, DumpSet, Period};
pub use s3_source::{S3DumpSource, DEFAULT_BUCKET_URL};
pub use source::{decompress_if_needed, parse_dump_file_name, DumpFileName, DumpSource};
pub use store::{DumpMetadataStore, SqliteDumpMetadataStore};
