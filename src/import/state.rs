use crate::dumps::DumpType;
use crate::error::ImportError;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Lifecycle of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state", content = "dump_type")]
pub enum ImportState {
    Pending,
    SelectingSet,
    StreamingType(DumpType),
    Batching(DumpType),
    CommittedType(DumpType),
    Complete,
    Aborted,
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Complete | ImportState::Aborted)
    }

    pub fn dump_type(&self) -> Option<DumpType> {
        match self {
            ImportState::StreamingType(t)
            | ImportState::Batching(t)
            | ImportState::CommittedType(t) => Some(*t),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ImportState) -> bool {
        use ImportState::*;
        match (*self, next) {
            (Complete, _) | (Aborted, _) => false,
            (_, Aborted) => true,
            (Pending, SelectingSet) => true,
            (SelectingSet, StreamingType(_)) | (SelectingSet, Complete) => true,
            (StreamingType(a), Batching(b)) => a == b,
            (Batching(a), StreamingType(b)) | (Batching(a), CommittedType(b)) => a == b,
            (CommittedType(a), StreamingType(b)) => a != b,
            (CommittedType(_), Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportState::Pending => write!(f, "PENDING"),
            ImportState::SelectingSet => write!(f, "SELECTING_SET"),
            ImportState::StreamingType(t) => write!(f, "STREAMING_TYPE({})", t),
            ImportState::Batching(t) => write!(f, "BATCHING({})", t),
            ImportState::CommittedType(t) => write!(f, "COMMITTED_TYPE({})", t),
            ImportState::Complete => write!(f, "COMPLETE"),
            ImportState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Tracks the current state of a run and every state it passed through.
#[derive(Debug, Clone)]
pub struct ImportStateMachine {
    current: ImportState,
    history: Vec<ImportState>,
}

impl Default for ImportStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportStateMachine {
    pub fn new() -> Self {
        Self {
            current: ImportState::Pending,
            history: vec![ImportState::Pending],
        }
    }

    pub fn current(&self) -> ImportState {
        self.current
    }

    pub fn history(&self) -> &[ImportState] {
        &self.history
    }

    pub fn transition(&mut self, next: ImportState) -> Result<(), ImportError> {
        if !self.current.can_transition_to(next) {
            return Err(ImportError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        debug!("Import state {} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `ABORTED` unless the run already reached a terminal state.
    pub fn abort(&mut self) {
        if !self.current.is_terminal() {
            debug!("Import state {} -> {}", self.current, ImportState::Aborted);
            self.current = ImportState::Aborted;
            self.history.push(ImportState::Aborted);
        }
    }
}
