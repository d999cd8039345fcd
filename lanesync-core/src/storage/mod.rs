pub mod local;
pub mod memory;

use std::sync::Arc;

use crate::types::DocumentId;

/// Host primitives the reconciler needs: read a document, write it back as
/// one atomic replacement, and report whether the host has caught up with a
/// write. Implementations: `LocalFiles` (filesystem), `MemoryHost`.
pub trait DocumentHost: Send + Sync {
    /// Read the current text of a document.
    fn read(&self, id: &DocumentId) -> Result<String, StorageError>;

    /// Replace the whole document with `text`, or fail without side effects.
    fn write(&self, id: &DocumentId, text: &str) -> Result<(), StorageError>;

    /// Whether the host's view of the document already reflects `text`.
    /// Hosts without a separate index are always ready.
    fn index_ready(&self, _id: &DocumentId, _text: &str) -> bool {
        true
    }
}

impl<T: DocumentHost + ?Sized> DocumentHost for Arc<T> {
    fn read(&self, id: &DocumentId) -> Result<String, StorageError> {
        (**self).read(id)
    }

    fn write(&self, id: &DocumentId, text: &str) -> Result<(), StorageError> {
        (**self).write(id, text)
    }

    fn index_ready(&self, id: &DocumentId, text: &str) -> bool {
        (**self).index_ready(id, text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not tracked: {0}")]
    NotTracked(DocumentId),

    #[error("Refusing to overwrite non-empty document {0} with empty content")]
    EmptyOverwrite(DocumentId),

    #[error("Write rejected for {id}: {reason}")]
    Rejected { id: DocumentId, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
