use super::state::{ImportState, ImportStateMachine};
use crate::dumps::{DumpCatalog, DumpRecord, DumpSource, DumpType, Period};
use crate::entity_store::EntityStore;
use crate::error::ImportError;
use crate::records::{convert_record, Command, ElementStream};
use anyhow::Context;
use serde::Serialize;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Dump type the run must be able to import; its dependencies come along.
    pub target: DumpType,
    /// Commands per transaction.
    pub batch_size: usize,
    /// Commands buffered between the decoder and the batch writer.
    pub queue_capacity: usize,
    /// Re-import dumps already marked imported.
    pub force: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            target: DumpType::Release,
            batch_size: 1000,
            queue_capacity: 10_000,
            force: false,
        }
    }
}

/// Per dump type outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    pub dump_type: DumpType,
    pub fingerprint: String,
    pub elements: u64,
    pub commands: u64,
    pub skipped: u64,
    pub batches: u64,
    pub rows_changed: u64,
    pub already_imported: bool,
}

impl TypeSummary {
    fn new(record: &DumpRecord) -> Self {
        Self {
            dump_type: record.dump_type,
            fingerprint: record.fingerprint.clone(),
            elements: 0,
            commands: 0,
            skipped: 0,
            batches: 0,
            rows_changed: 0,
            already_imported: false,
        }
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub state: ImportState,
    pub period: Option<Period>,
    pub error: Option<ImportError>,
    pub types: Vec<TypeSummary>,
    pub history: Vec<ImportState>,
    /// Dump type being imported when the run aborted.
    pub failed_type: Option<DumpType>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.state == ImportState::Complete
    }

    pub fn summary(&self, dump_type: DumpType) -> Option<&TypeSummary> {
        self.types.iter().find(|s| s.dump_type == dump_type)
    }
}

#[derive(Debug, Default)]
struct StreamStats {
    elements: u64,
    skipped: u64,
}

/// Drives one import run: picks the newest complete dump set and imports
/// each type of it in dependency order.
pub struct ImportOrchestrator {
    catalog: Arc<DumpCatalog>,
    source: Arc<dyn DumpSource>,
    entities: Arc<dyn EntityStore>,
    config: ImportConfig,
}

impl ImportOrchestrator {
    pub fn new(
        catalog: Arc<DumpCatalog>,
        source: Arc<dyn DumpSource>,
        entities: Arc<dyn EntityStore>,
        config: ImportConfig,
    ) -> Self {
        Self {
            catalog,
            source,
            entities,
            config,
        }
    }

    /// Runs the import to completion, failure or cancellation.
    ///
    /// Never returns early with an error: the outcome, including the error
    /// that aborted the run, is carried by the report.
    pub async fn run(&self, cancel: CancellationToken) -> ImportReport {
        let mut machine = ImportStateMachine::new();
        let mut period = None;
        let mut types = Vec::new();

        let started = Instant::now();
        let result = self
            .run_inner(&mut machine, &mut period, &mut types, &cancel)
            .await;

        let mut failed_type = None;
        let error = match result {
            Ok(()) => {
                info!(
                    "Import of {} finished in {:.1}s",
                    self.config.target,
                    started.elapsed().as_secs_f64()
                );
                None
            }
            Err(e) => {
                match &e {
                    ImportError::Cancelled => warn!("Import cancelled in {}", machine.current()),
                    other => error!("Import aborted in {}: {}", machine.current(), other),
                }
                failed_type = match machine.current() {
                    ImportState::CommittedType(_) => None,
                    state => state.dump_type(),
                };
                machine.abort();
                Some(e)
            }
        };

        ImportReport {
            state: machine.current(),
            period,
            error,
            types,
            history: machine.history().to_vec(),
            failed_type,
        }
    }

    async fn run_inner(
        &self,
        machine: &mut ImportStateMachine,
        period: &mut Option<Period>,
        types: &mut Vec<TypeSummary>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        if self.config.batch_size == 0 {
            return Err(ImportError::invalid_argument("batch_size must be positive"));
        }
        if self.config.queue_capacity == 0 {
            return Err(ImportError::invalid_argument(
                "queue_capacity must be positive",
            ));
        }

        machine.transition(ImportState::SelectingSet)?;
        let catalog = self.catalog.clone();
        let target = self.config.target;
        let set = tokio::task::spawn_blocking(move || catalog.latest_complete_set_for(target))
            .await
            .context("Dump set selection task failed")??;
        *period = Some(set.period());
        let order = set.import_order()?;
        info!(
            "Importing {} dump types from {}: {:?}",
            order.len(),
            set.period(),
            order
        );
        for record in set.records() {
            debug!(
                "Using {} dump {} published on {}",
                record.dump_type, record.fingerprint, record.published_on
            );
        }

        for dump_type in order {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            let record = set.get(dump_type).ok_or_else(|| {
                ImportError::DumpNotFound(format!("No {} dump in {}", dump_type, set.period()))
            })?;

            let mut summary = TypeSummary::new(record);
            if record.is_imported() && !self.config.force {
                info!(
                    "Skipping {} dump {}: already imported",
                    dump_type, record.fingerprint
                );
                summary.already_imported = true;
                types.push(summary);
                continue;
            }

            let result = self
                .import_type(machine, record, &mut summary, cancel)
                .await;
            types.push(summary);
            result?;
        }

        machine.transition(ImportState::Complete)
    }

    async fn import_type(
        &self,
        machine: &mut ImportStateMachine,
        record: &DumpRecord,
        summary: &mut TypeSummary,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let dump_type = record.dump_type;
        let started = Instant::now();
        machine.transition(ImportState::StreamingType(dump_type))?;
        info!("Importing {} dump {}", dump_type, record.fingerprint);

        let (tx, mut rx) = mpsc::channel::<Command>(self.config.queue_capacity);
        let producer = {
            let source = self.source.clone();
            let locator = record.locator.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                produce_commands(source.as_ref(), dump_type, &locator, &cancel, tx)
            })
        };

        let mut pending = Vec::with_capacity(self.config.batch_size);
        let consumed: Result<(), ImportError> = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(ImportError::Cancelled),
                next = rx.recv() => match next {
                    Some(command) => {
                        pending.push(command);
                        if pending.len() >= self.config.batch_size {
                            let flushed = match self.flush(machine, dump_type, &mut pending, summary).await {
                                Ok(()) => machine.transition(ImportState::StreamingType(dump_type)),
                                Err(e) => Err(e),
                            };
                            if let Err(e) = flushed {
                                break Err(e);
                            }
                        }
                    }
                    None => break Ok(()),
                },
            }
        };

        // Unblocks the decoder if the writer stopped early.
        drop(rx);
        let produced = producer
            .await
            .context("Dump decoder task failed")
            .map_err(ImportError::from);
        consumed?;
        let stats = produced??;
        summary.elements = stats.elements;
        summary.skipped = stats.skipped;

        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        self.flush(machine, dump_type, &mut pending, summary).await?;

        machine.transition(ImportState::CommittedType(dump_type))?;
        let catalog = self.catalog.clone();
        let fingerprint = record.fingerprint.clone();
        tokio::task::spawn_blocking(move || catalog.mark_imported(&fingerprint))
            .await
            .context("Catalog update task failed")??;
        info!(
            "Imported {} dump: {} elements, {} skipped, {} commands in {} batches, {} rows changed ({:.1}s)",
            dump_type,
            summary.elements,
            summary.skipped,
            summary.commands,
            summary.batches,
            summary.rows_changed,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Commits `pending` as one transaction and leaves the machine in
    /// `BATCHING`. An empty batch only moves the state.
    async fn flush(
        &self,
        machine: &mut ImportStateMachine,
        dump_type: DumpType,
        pending: &mut Vec<Command>,
        summary: &mut TypeSummary,
    ) -> Result<(), ImportError> {
        machine.transition(ImportState::Batching(dump_type))?;
        if pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(pending, Vec::with_capacity(self.config.batch_size));
        let entities = self.entities.clone();
        let receipt = tokio::task::spawn_blocking(move || entities.apply_batch(&batch))
            .await
            .context("Batch writer task failed")?
            .map_err(|error| ImportError::BatchCommitFailure { dump_type, error })?;

        summary.batches += 1;
        summary.commands += receipt.commands as u64;
        summary.rows_changed += receipt.rows_changed as u64;
        debug!(
            "Committed {} batch {}: {} commands, {} rows changed",
            dump_type, summary.batches, receipt.commands, receipt.rows_changed
        );
        Ok(())
    }
}

/// Decodes one dump and feeds its commands to `tx`.
///
/// Returns early without error when the receiving side is gone.
fn produce_commands(
    source: &dyn DumpSource,
    dump_type: DumpType,
    locator: &str,
    cancel: &CancellationToken,
    tx: mpsc::Sender<Command>,
) -> Result<StreamStats, ImportError> {
    let read_failure = |message: String| ImportError::StreamReadFailure { dump_type, message };

    let reader = source
        .open_stream(locator)
        .map_err(|e| read_failure(format!("{:#}", e)))?;
    let mut elements = ElementStream::new(BufReader::with_capacity(STREAM_BUFFER_SIZE, reader));

    let mut stats = StreamStats::default();
    while let Some(element) = elements.next() {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let element = element.map_err(|e| read_failure(e.to_string()))?;
        stats.elements += 1;

        match convert_record(dump_type, &element) {
            Ok(commands) => {
                for command in commands {
                    if tx.blocking_send(command).is_err() {
                        return Ok(stats);
                    }
                }
            }
            Err(skipped) => {
                stats.skipped += 1;
                debug!("{} (before byte {})", skipped, elements.position());
            }
        }
    }
    Ok(stats)
}
