/// In-memory document host for embedding the reconciler in editors that
/// already hold document text, and for tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{DocumentHost, StorageError};
use crate::types::DocumentId;

#[derive(Debug, Default)]
pub struct MemoryHost {
    documents: RwLock<HashMap<DocumentId, String>>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &DocumentId, text: &str) {
        self.documents
            .write()
            .unwrap()
            .insert(id.clone(), text.to_string());
    }

    pub fn get(&self, id: &DocumentId) -> Option<String> {
        self.documents.read().unwrap().get(id).cloned()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl DocumentHost for MemoryHost {
    fn read(&self, id: &DocumentId) -> Result<String, StorageError> {
        self.get(id).ok_or_else(|| StorageError::NotTracked(id.clone()))
    }

    fn write(&self, id: &DocumentId, text: &str) -> Result<(), StorageError> {
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Rejected {
                id: id.clone(),
                reason: "writes disabled".to_string(),
            });
        }
        self.insert(id, text);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
