/// Per-document reconciliation state.
///
/// Each tracked document owns its last-seen text, its pass phase (which
/// doubles as the reentrancy guard) and the time of its last write. Nothing
/// here is shared between documents.

use std::collections::HashMap;
use tokio::time::Instant;

use crate::types::DocumentId;

/// Where a document is in its reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Detecting,
    Protecting,
    Syncing,
    /// Writing, then cooling down until `release_at` so the echo of our own
    /// write is ignored. `None` while the write is still in flight.
    Writing { release_at: Option<Instant> },
}

#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub previous_text: Option<String>,
    pub phase: Phase,
    pub last_write: Option<Instant>,
}

impl Default for DocumentContext {
    fn default() -> Self {
        Self {
            previous_text: None,
            phase: Phase::Idle,
            last_write: None,
        }
    }
}

impl DocumentContext {
    /// Whether a new pass must be dropped at `now`. An expired cooldown
    /// releases the guard.
    pub fn is_busy(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Idle => false,
            Phase::Writing {
                release_at: Some(release_at),
            } if now >= release_at => {
                self.phase = Phase::Idle;
                false
            }
            _ => true,
        }
    }
}

/// Document contexts keyed by document identity.
#[derive(Debug, Default)]
pub struct DocumentStore {
    contexts: HashMap<DocumentId, DocumentContext>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `id`, created on first observation.
    pub fn entry(&mut self, id: &DocumentId) -> &mut DocumentContext {
        self.contexts.entry(id.clone()).or_default()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&DocumentContext> {
        self.contexts.get(id)
    }

    pub fn get_mut(&mut self, id: &DocumentId) -> Option<&mut DocumentContext> {
        self.contexts.get_mut(id)
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<DocumentContext> {
        self.contexts.remove(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
