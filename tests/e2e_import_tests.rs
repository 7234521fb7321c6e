//! End-to-end tests for dump discovery and import runs
//!
//! Each test works on real SQLite files in a temporary directory, fed by an
//! in-memory dump source.

mod common;

use common::{
    CancellingStore, FailingStore, TestEnv, ARTISTS_UPDATED_XML, ARTISTS_XML, ARTIST_1_ID,
    ARTIST_1_NAME, ARTIST_2_ID, ARTIST_2_NAME, BLANK_PROFILE_ARTIST_ID, FEB_2024, LABELS_XML,
    MAR_2024, MASTERS_XML, MASTER_COUNT, RELEASES_REVISED_XML,
};
use discogs_importer::dumps::{DumpType, Period};
use discogs_importer::error::ImportError;
use discogs_importer::import::ImportState;
use discogs_importer::records::EntityKind;
use rusqlite::types::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Set selection
// =============================================================================

#[tokio::test]
async fn test_incomplete_latest_period_falls_back_to_previous() {
    let env = TestEnv::new();
    env.publish_full_set(FEB_2024);
    let report = env.refresh().await;
    assert!(report.is_clean());
    assert_eq!(report.new_records().count(), 4);

    let march_artists = env.source.publish(DumpType::Artist, MAR_2024, ARTISTS_XML);
    let report = env.refresh().await;
    assert_eq!(report.new_records().count(), 1);

    let report = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;

    assert!(report.is_complete(), "{:?}", report.error);
    assert_eq!(report.period, Some(Period::new(2024, 2).unwrap()));
    let imported: Vec<_> = report.types.iter().map(|s| s.dump_type).collect();
    assert_eq!(imported, DumpType::ALL.to_vec());
    assert!(report.types.iter().all(|s| !s.already_imported));
    assert!(!env.catalog.is_imported(&march_artists).unwrap());
    assert_eq!(env.count(EntityKind::Release), 1);
}

#[tokio::test]
async fn test_missing_master_in_latest_period_falls_back() {
    let env = TestEnv::new();
    env.publish_full_set(FEB_2024);
    env.refresh().await;
    let march_artists = env.source.publish(DumpType::Artist, MAR_2024, ARTISTS_XML);
    let march_labels = env.source.publish(DumpType::Label, MAR_2024, LABELS_XML);
    let report = env.refresh().await;
    assert_eq!(report.new_records().count(), 2);

    let report = env
        .orchestrator(env.config(DumpType::Master))
        .run(CancellationToken::new())
        .await;

    assert!(report.is_complete(), "{:?}", report.error);
    assert_eq!(report.period, Some(Period::new(2024, 2).unwrap()));
    let imported: Vec<_> = report.types.iter().map(|s| s.dump_type).collect();
    assert_eq!(
        imported,
        vec![DumpType::Artist, DumpType::Label, DumpType::Master]
    );
    assert!(!env.catalog.is_imported(&march_artists).unwrap());
    assert!(!env.catalog.is_imported(&march_labels).unwrap());
    assert_eq!(env.count(EntityKind::Master), MASTER_COUNT as usize);
    assert_eq!(env.count(EntityKind::Release), 0);
}

#[tokio::test]
async fn test_import_without_complete_set_aborts() {
    let env = TestEnv::new();
    env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    env.source.publish(DumpType::Label, FEB_2024, LABELS_XML);
    env.refresh().await;

    let report = env
        .orchestrator(env.config(DumpType::Master))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, ImportState::Aborted);
    assert!(matches!(report.error, Some(ImportError::DumpNotFound(_))));
    assert!(report.types.is_empty());
    assert_eq!(report.failed_type, None);
    assert_eq!(env.count(EntityKind::Artist), 0);
    assert_eq!(env.count(EntityKind::Label), 0);
}

// =============================================================================
// Conversion and persistence
// =============================================================================

#[tokio::test]
async fn test_blank_profile_is_stored_as_null() {
    let env = TestEnv::new();
    env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    env.refresh().await;

    let report = env
        .orchestrator(env.config(DumpType::Artist))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);

    assert_eq!(
        env.query_value(&format!(
            "SELECT profile FROM artist WHERE id = {}",
            BLANK_PROFILE_ARTIST_ID
        )),
        Value::Null
    );
    assert_eq!(
        env.query_value(&format!("SELECT profile FROM artist WHERE id = {}", ARTIST_2_ID)),
        Value::Null
    );
    assert_eq!(
        env.query_value("SELECT COUNT(*) FROM artist WHERE profile = ''"),
        Value::Integer(0)
    );
    assert_eq!(
        env.query_value(&format!("SELECT name FROM artist WHERE id = {}", ARTIST_1_ID)),
        Value::Text(ARTIST_1_NAME.to_string())
    );
    assert_eq!(
        env.query_value(&format!("SELECT name FROM artist WHERE id = {}", ARTIST_2_ID)),
        Value::Text(ARTIST_2_NAME.to_string())
    );
}

#[tokio::test]
async fn test_artist_children_are_persisted() {
    let env = TestEnv::new();
    env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    env.refresh().await;

    let report = env
        .orchestrator(env.config(DumpType::Artist))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);

    assert_eq!(env.count(EntityKind::Artist), 3);
    assert_eq!(env.count(EntityKind::ArtistNameVariation), 2);
    assert_eq!(env.count(EntityKind::ArtistAlias), 1);
    assert_eq!(env.count(EntityKind::ArtistUrl), 1);
    assert_eq!(env.count(EntityKind::ArtistMember), 2);
    assert_eq!(
        env.query_value("SELECT name FROM artist_member WHERE group_id = 2 AND member_id = 27"),
        Value::Text("Cari Lekebusch".to_string())
    );
}

#[tokio::test]
async fn test_newer_dump_updates_without_blanking() {
    let env = TestEnv::new();
    env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    env.refresh().await;
    let report = env
        .orchestrator(env.config(DumpType::Artist))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);

    env.source
        .publish(DumpType::Artist, MAR_2024, ARTISTS_UPDATED_XML);
    env.refresh().await;
    let report = env
        .orchestrator(env.config(DumpType::Artist))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);
    assert_eq!(report.period, Some(Period::new(2024, 3).unwrap()));

    let summary = report.summary(DumpType::Artist).unwrap();
    assert_eq!(summary.elements, 2);
    // One profile update, four children of artist 1 and two members of artist 2 removed.
    assert_eq!(summary.rows_changed, 7);
    assert_eq!(
        env.query_value(&format!("SELECT profile FROM artist WHERE id = {}", ARTIST_1_ID)),
        Value::Text("Swedish techno producer, also known as Jesper Dahlbäck.".to_string())
    );
    // Missing from the newer dump, so left as it was.
    assert_eq!(
        env.query_value(&format!("SELECT real_name FROM artist WHERE id = {}", ARTIST_2_ID)),
        Value::Text("Cari Lekebusch & Alexi Delano".to_string())
    );
    assert_eq!(env.count(EntityKind::Artist), 3);
    assert_eq!(env.count(EntityKind::ArtistNameVariation), 0);
    assert_eq!(env.count(EntityKind::ArtistAlias), 0);
    assert_eq!(env.count(EntityKind::ArtistUrl), 0);
    assert_eq!(env.count(EntityKind::ArtistMember), 0);
}

#[tokio::test]
async fn test_newer_dump_shrinks_child_lists() {
    let env = TestEnv::new();
    env.publish_full_set(FEB_2024);
    env.refresh().await;
    let report = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);
    assert_eq!(env.count(EntityKind::ReleaseTrack), 2);

    env.source.publish(DumpType::Artist, MAR_2024, ARTISTS_XML);
    env.source.publish(DumpType::Label, MAR_2024, LABELS_XML);
    env.source.publish(DumpType::Master, MAR_2024, MASTERS_XML);
    env.source
        .publish(DumpType::Release, MAR_2024, RELEASES_REVISED_XML);
    env.refresh().await;
    let report = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;
    assert!(report.is_complete(), "{:?}", report.error);
    assert_eq!(report.period, Some(Period::new(2024, 3).unwrap()));

    assert_eq!(env.count(EntityKind::Release), 1);
    assert_eq!(env.count(EntityKind::ReleaseTrack), 1);
    assert_eq!(env.count(EntityKind::ReleaseGenre), 1);
    assert_eq!(
        env.query_value("SELECT genre FROM release_genre WHERE release_id = 1"),
        Value::Text("Rock".to_string())
    );
    assert_eq!(
        env.query_value("SELECT title FROM release_track WHERE release_id = 1"),
        Value::Text("Östermalm".to_string())
    );
    // Identical artist records in the newer dump change nothing.
    assert_eq!(report.summary(DumpType::Artist).unwrap().rows_changed, 0);
}

// =============================================================================
// Re-import
// =============================================================================

#[tokio::test]
async fn test_unchanged_reimport_is_noop() {
    let env = TestEnv::new();
    env.publish_full_set(FEB_2024);
    env.refresh().await;

    let first = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;
    assert!(first.is_complete(), "{:?}", first.error);
    let counts: Vec<usize> = EntityKind::ALL.iter().map(|e| env.count(*e)).collect();

    // Without force every type is already imported.
    let skipped = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;
    assert!(skipped.is_complete());
    assert!(skipped.types.iter().all(|s| s.already_imported));
    assert_eq!(
        skipped.history,
        vec![
            ImportState::Pending,
            ImportState::SelectingSet,
            ImportState::Complete
        ]
    );

    // Forced, everything is rewritten to identical values.
    let mut config = env.config(DumpType::Release);
    config.force = true;
    let forced = env.orchestrator(config).run(CancellationToken::new()).await;
    assert!(forced.is_complete(), "{:?}", forced.error);
    for summary in &forced.types {
        assert!(!summary.already_imported);
        assert!(summary.commands > 0, "{:?}", summary);
        assert_eq!(summary.rows_changed, 0, "{:?}", summary);
    }
    let after: Vec<usize> = EntityKind::ALL.iter().map(|e| env.count(*e)).collect();
    assert_eq!(counts, after);
}

// =============================================================================
// Failures and cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_mid_master_then_retry() {
    let env = TestEnv::new();
    env.publish_full_set(FEB_2024);
    env.refresh().await;
    let set = env.catalog.latest_complete_set().unwrap();
    let fingerprint = |t: DumpType| set.get(t).unwrap().fingerprint.clone();

    let cancel = CancellationToken::new();
    let store = Arc::new(CancellingStore {
        inner: env.entities.clone(),
        cancel: cancel.clone(),
        trigger: EntityKind::Master,
    });
    let report = env
        .orchestrator_with_store(store, env.config(DumpType::Release))
        .run(cancel)
        .await;

    assert_eq!(report.state, ImportState::Aborted);
    assert!(matches!(report.error, Some(ImportError::Cancelled)));
    assert!(env.catalog.is_imported(&fingerprint(DumpType::Artist)).unwrap());
    assert!(env.catalog.is_imported(&fingerprint(DumpType::Label)).unwrap());
    assert!(!env.catalog.is_imported(&fingerprint(DumpType::Master)).unwrap());
    assert!(!env.catalog.is_imported(&fingerprint(DumpType::Release)).unwrap());
    // The batch in flight was committed, nothing after it.
    let master = report.summary(DumpType::Master).unwrap();
    assert_eq!(master.batches, 1);
    assert_eq!(env.count(EntityKind::Master), 1);
    assert_eq!(env.count(EntityKind::Release), 0);
    assert!(report.summary(DumpType::Release).is_none());

    let retry = env
        .orchestrator(env.config(DumpType::Release))
        .run(CancellationToken::new())
        .await;
    assert!(retry.is_complete(), "{:?}", retry.error);
    assert!(retry.summary(DumpType::Artist).unwrap().already_imported);
    assert!(retry.summary(DumpType::Label).unwrap().already_imported);
    let master = retry.summary(DumpType::Master).unwrap();
    assert!(!master.already_imported);
    assert_eq!(master.elements, MASTER_COUNT);
    assert_eq!(env.count(EntityKind::Master), MASTER_COUNT as usize);
    assert_eq!(env.count(EntityKind::Release), 1);
    assert!(env.catalog.is_imported(&fingerprint(DumpType::Release)).unwrap());
}

#[tokio::test]
async fn test_batch_commit_failure_aborts_at_current_type() {
    let env = TestEnv::new();
    let artists = env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    let labels = env.source.publish(DumpType::Label, FEB_2024, LABELS_XML);
    let masters = env.source.publish(DumpType::Master, FEB_2024, MASTERS_XML);
    env.refresh().await;

    let store = Arc::new(FailingStore {
        inner: env.entities.clone(),
        failing: EntityKind::Master,
    });
    let report = env
        .orchestrator_with_store(store, env.config(DumpType::Master))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, ImportState::Aborted);
    let error = report.error.as_ref().unwrap();
    assert!(matches!(
        error,
        ImportError::BatchCommitFailure {
            dump_type: DumpType::Master,
            ..
        }
    ));
    assert!(error.is_retryable());
    assert_eq!(report.failed_type, Some(DumpType::Master));
    assert_eq!(env.count(EntityKind::Artist), 3);
    assert_eq!(env.count(EntityKind::Label), 2);
    assert_eq!(env.count(EntityKind::Master), 0);
    assert!(env.catalog.is_imported(&artists).unwrap());
    assert!(env.catalog.is_imported(&labels).unwrap());
    assert!(!env.catalog.is_imported(&masters).unwrap());

    let retry = env
        .orchestrator(env.config(DumpType::Master))
        .run(CancellationToken::new())
        .await;
    assert!(retry.is_complete(), "{:?}", retry.error);
    assert!(retry.summary(DumpType::Label).unwrap().already_imported);
    assert_eq!(env.count(EntityKind::Master), MASTER_COUNT as usize);
    assert_eq!(env.count(EntityKind::MasterStyle), 1);
    assert!(env.catalog.is_imported(&masters).unwrap());
}

#[tokio::test]
async fn test_broken_stream_aborts_without_marking() {
    let env = TestEnv::new();
    env.source.publish(DumpType::Artist, FEB_2024, ARTISTS_XML);
    env.source.publish(DumpType::Label, FEB_2024, LABELS_XML);
    let masters = env
        .source
        .publish_broken(DumpType::Master, FEB_2024, MASTERS_XML, 40);
    env.refresh().await;

    let report = env
        .orchestrator(env.config(DumpType::Master))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, ImportState::Aborted);
    assert!(matches!(
        report.error,
        Some(ImportError::StreamReadFailure {
            dump_type: DumpType::Master,
            ..
        })
    ));
    assert_eq!(env.count(EntityKind::Master), 0);
    assert_eq!(report.failed_type, Some(DumpType::Master));
    assert!(!env.catalog.is_imported(&masters).unwrap());
    assert!(report.history.contains(&ImportState::CommittedType(DumpType::Artist)));
    assert!(report.history.contains(&ImportState::CommittedType(DumpType::Label)));
    assert_eq!(report.history.last(), Some(&ImportState::Aborted));
}
