//! Run-level error taxonomy.
//!
//! Element-level problems are reported as [`crate::records::RecordSkipped`]
//! and never show up here; everything in [`ImportError`] is fatal to the
//! operation that returned it.

use crate::dumps::DumpType;
use crate::entity_store::PersistError;
use crate::import::ImportState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dump not found: {0}")]
    DumpNotFound(String),

    #[error("Batch commit failed while importing {dump_type}: {error}")]
    BatchCommitFailure {
        dump_type: DumpType,
        #[source]
        error: PersistError,
    },

    #[error("Could not read {dump_type} dump: {message}")]
    StreamReadFailure { dump_type: DumpType, message: String },

    #[error("Import cancelled")]
    Cancelled,

    #[error("Invalid import state transition: {from} -> {to}")]
    InvalidTransition { from: ImportState, to: ImportState },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ImportError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ImportError::InvalidArgument(message.into())
    }

    /// Whether rerunning the same operation could succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ImportError::BatchCommitFailure { .. }
                | ImportError::StreamReadFailure { .. }
                | ImportError::Cancelled
                | ImportError::Store(_)
        )
    }
}
