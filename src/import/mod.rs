//! Import runs: dump set selection, streaming and batched persistence.

mod orchestrator;
mod state;

pub use orchestrator::{ImportConfig, ImportOrchestrator, ImportReport, TypeSummary};
pub use state::{ImportState, ImportStateMachine};
