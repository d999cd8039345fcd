/// What the watcher reports about a tracked board file.

use crate::types::DocumentId;

/// How a board file changed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// Contents were rewritten in place.
    Modified,
    /// The file disappeared, possibly as the first half of a save-by-rename.
    Removed,
    /// A file appeared at a tracked path.
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    pub id: DocumentId,
    pub change: FileChange,
}

impl DocumentEvent {
    pub fn new(id: DocumentId, change: FileChange) -> Self {
        Self { id, change }
    }
}
