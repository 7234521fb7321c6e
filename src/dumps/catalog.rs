use super::dump_type::DumpType;
use super::models::{DumpMetadata, DumpRecord, DumpSet, Period};
use super::source::DumpSource;
use super::store::DumpMetadataStore;
use crate::error::ImportError;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDump {
    pub record: DumpRecord,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub dump_type: DumpType,
    pub error: String,
}

/// Outcome of polling a dump source once for every type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub discovered: Vec<DiscoveredDump>,
    pub failures: Vec<RefreshFailure>,
}

impl RefreshReport {
    pub fn new_records(&self) -> impl Iterator<Item = &DumpRecord> {
        self.discovered.iter().filter(|d| d.is_new).map(|d| &d.record)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decides which dumps are known, which are newest, and which sets can be imported.
#[derive(Clone)]
pub struct DumpCatalog {
    store: Arc<dyn DumpMetadataStore>,
}

impl DumpCatalog {
    pub fn new(store: Arc<dyn DumpMetadataStore>) -> Self {
        Self { store }
    }

    pub fn is_known(&self, fingerprint: &str) -> Result<bool, ImportError> {
        Ok(self.store.exists(fingerprint)?)
    }

    /// Records a dump unless its fingerprint is already known.
    ///
    /// Returns the stored record and whether this call created it. Safe to call
    /// concurrently for the same fingerprint: exactly one caller sees `true`.
    pub fn record_if_new(
        &self,
        dump_type: DumpType,
        fingerprint: &str,
        published_on: NaiveDate,
        locator: &str,
    ) -> Result<(DumpRecord, bool), ImportError> {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(ImportError::invalid_argument("Fingerprint must not be blank"));
        }
        // Every recorded dump must fall in a representable period.
        Period::new(published_on.year(), published_on.month())?;

        let candidate = DumpRecord {
            dump_type,
            fingerprint: fingerprint.to_string(),
            published_on,
            locator: locator.to_string(),
            discovered_at: Utc::now(),
            imported_at: None,
        };
        let is_new = self.store.insert_if_absent(&candidate)?;
        let stored = self
            .store
            .find_by_fingerprint(fingerprint)?
            .ok_or_else(|| {
                anyhow::anyhow!("Dump {} vanished right after insert", fingerprint)
            })?;

        if is_new {
            info!(
                "Recorded new {} dump {} published on {}",
                dump_type, fingerprint, published_on
            );
        } else if stored.dump_type != dump_type {
            warn!(
                "Fingerprint {} is already recorded as {}, ignoring it as {}",
                fingerprint, stored.dump_type, dump_type
            );
        } else {
            debug!("{} dump {} already known", dump_type, fingerprint);
        }
        Ok((stored, is_new))
    }

    pub fn record_metadata(&self, metadata: &DumpMetadata) -> Result<(DumpRecord, bool), ImportError> {
        self.record_if_new(
            metadata.dump_type,
            &metadata.fingerprint,
            metadata.published_on,
            &metadata.locator,
        )
    }

    pub fn most_recent(&self, dump_type: DumpType) -> Result<Option<DumpRecord>, ImportError> {
        Ok(self.store.find_latest(dump_type)?)
    }

    pub fn most_recent_in_period(
        &self,
        dump_type: DumpType,
        year: i32,
        month: u32,
    ) -> Result<Option<DumpRecord>, ImportError> {
        let period = Period::new(year, month)?;
        Ok(self.store.find_latest_in_period(dump_type, period)?)
    }

    pub fn all_in_period(
        &self,
        types: &[DumpType],
        year: i32,
        month: u32,
    ) -> Result<Vec<DumpRecord>, ImportError> {
        let period = Period::new(year, month)?;
        Ok(self.store.find_all_in_period(types, period)?)
    }

    /// Newest period holding a dump of every type, as needed to import releases.
    pub fn latest_complete_set(&self) -> Result<DumpSet, ImportError> {
        self.latest_complete_set_for(DumpType::Release)
    }

    /// Newest period holding a dump of every type `target` depends on.
    ///
    /// Within that period the most recent dump of each type is chosen.
    pub fn latest_complete_set_for(&self, target: DumpType) -> Result<DumpSet, ImportError> {
        let required = target.dependencies();
        for period in self.store.list_periods()? {
            let available = self.store.count_in_period(required, period)?;
            if available < required.len() {
                debug!(
                    "Period {} has {}/{} dump types needed for {}",
                    period,
                    available,
                    required.len(),
                    target
                );
                continue;
            }

            let mut records = Vec::with_capacity(required.len());
            for dump_type in required {
                if let Some(record) = self.store.find_latest_in_period(*dump_type, period)? {
                    records.push(record);
                }
            }
            let set = DumpSet::complete_for(target, period, records)?;
            info!("Selected dump set for {} from {}", target, period);
            return Ok(set);
        }

        Err(ImportError::DumpNotFound(format!(
            "No period holds dumps for all of {:?}",
            required
        )))
    }

    pub fn is_imported(&self, fingerprint: &str) -> Result<bool, ImportError> {
        Ok(self
            .store
            .find_by_fingerprint(fingerprint)?
            .is_some_and(|r| r.is_imported()))
    }

    pub fn mark_imported(&self, fingerprint: &str) -> Result<(), ImportError> {
        if !self.store.mark_imported(fingerprint, Utc::now())? {
            return Err(ImportError::DumpNotFound(format!(
                "Unknown dump fingerprint {}",
                fingerprint
            )));
        }
        Ok(())
    }

    /// Polls `source` for every dump type and records what is new.
    ///
    /// Listings run concurrently and every listed dump is recorded, so an
    /// older complete period stays selectable. A failing type is reported
    /// and does not prevent the others from being recorded.
    pub async fn refresh(&self, source: &dyn DumpSource) -> RefreshReport {
        let listings = DumpType::ALL.map(|t| async move { (t, source.list_dumps(t).await) });
        let results = futures::future::join_all(listings).await;

        let mut report = RefreshReport::default();
        for (dump_type, result) in results {
            let outcomes = match result {
                Ok(listed) => {
                    let catalog = self.clone();
                    tokio::task::spawn_blocking(move || {
                        listed
                            .iter()
                            .map(|metadata| catalog.record_listed(dump_type, metadata))
                            .collect::<Vec<_>>()
                    })
                    .await
                    .unwrap_or_else(|e| {
                        vec![Err(ImportError::from(anyhow::anyhow!(
                            "Recording task failed: {}",
                            e
                        )))]
                    })
                }
                Err(e) => vec![Err(ImportError::from(e))],
            };
            for outcome in outcomes {
                match outcome {
                    Ok((record, is_new)) => {
                        report.discovered.push(DiscoveredDump { record, is_new })
                    }
                    Err(e) => {
                        warn!("Refreshing {} dump failed: {:#}", dump_type, e);
                        report.failures.push(RefreshFailure {
                            dump_type,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Dump refresh done: {} discovered, {} new, {} failed",
            report.discovered.len(),
            report.new_records().count(),
            report.failures.len()
        );
        report
    }

    fn record_listed(
        &self,
        dump_type: DumpType,
        metadata: &DumpMetadata,
    ) -> Result<(DumpRecord, bool), ImportError> {
        if metadata.dump_type != dump_type {
            return Err(ImportError::invalid_argument(format!(
                "Source returned {} metadata when asked for {}",
                metadata.dump_type, dump_type
            )));
        }
        self.record_metadata(metadata)
    }
}
