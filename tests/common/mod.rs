//! Common test infrastructure
//!
//! This module provides everything the end-to-end tests need.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestEnv, FEB_2024};
//! use discogs_importer::dumps::DumpType;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::test]
//! async fn test_import_artists() {
//!     let env = TestEnv::new();
//!     env.publish_full_set(FEB_2024);
//!     env.refresh().await;
//!
//!     let report = env
//!         .orchestrator(env.config(DumpType::Artist))
//!         .run(CancellationToken::new())
//!         .await;
//!     assert!(report.is_complete());
//! }
//! ```

mod constants;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{CancellingStore, FailingStore, FixtureSource, TestEnv};
