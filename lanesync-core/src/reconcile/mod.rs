pub mod context;
pub mod orchestrator;
pub mod pass;

pub use context::{DocumentContext, DocumentStore, Phase};
pub use orchestrator::Reconciler;
pub use pass::{reconcile_text, PassResult};

use crate::storage::StorageError;
use crate::types::DocumentId;

/// How a reconciliation request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassStatus {
    /// First observation of the document; recorded as its baseline.
    Baseline,
    /// Text equal to the last seen text.
    NoChange,
    /// Dropped: a pass or post-write cooldown was in progress.
    Busy,
    /// The change needed no corrections.
    InSync,
    /// Corrections were written back.
    Written { movements: usize, restored: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Text the document should now hold.
    pub text: String,
    pub changed: bool,
    pub status: PassStatus,
}

impl ReconcileOutcome {
    pub(crate) fn unchanged(text: &str, status: PassStatus) -> Self {
        Self {
            text: text.to_string(),
            changed: false,
            status,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to read {0}: {1}")]
    Read(DocumentId, #[source] StorageError),

    /// The write-back failed; `fallback` is the unmodified observed text.
    #[error("Failed to write {id}: {source}")]
    WriteFailed {
        id: DocumentId,
        fallback: String,
        #[source]
        source: StorageError,
    },
}
