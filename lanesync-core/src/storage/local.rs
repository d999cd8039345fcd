/// Local filesystem document host.
///
/// Manages board files on disk with:
/// - SHA-256 document IDs (first 12 hex chars of the canonical path)
/// - Atomic writes (write to .tmp, fsync, rename)
/// - Self-write fingerprints so watcher echoes of our own writes are dropped
/// - Per-document write mutex

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use sha2::{Digest, Sha256};

use super::{DocumentHost, StorageError};
use crate::types::DocumentId;
use crate::watcher::self_write::{Fingerprint, SelfWriteTracker};

/// Filesystem-backed document host.
pub struct LocalFiles {
    /// document id -> canonical file path
    paths: RwLock<HashMap<DocumentId, PathBuf>>,
    /// Per-document write mutex
    write_locks: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
    /// Fingerprints of writes we made and have not seen echoed yet
    self_writes: Mutex<SelfWriteTracker>,
}

impl Default for LocalFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFiles {
    pub fn new() -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            self_writes: Mutex::new(SelfWriteTracker::new()),
        }
    }

    /// Deterministic document ID from a file path: SHA-256, first 12 hex chars.
    pub fn document_id_from_path(file_path: &Path) -> DocumentId {
        let mut hasher = Sha256::new();
        hasher.update(file_path.to_string_lossy().as_bytes());
        let result = hasher.finalize();
        DocumentId::new(hex::encode(&result[..6]))
    }

    /// Track a file. Fails if it cannot be read.
    pub fn add_document(&self, file_path: &Path) -> Result<DocumentId, StorageError> {
        let file_path = fs::canonicalize(file_path).unwrap_or_else(|_| file_path.to_path_buf());
        fs::metadata(&file_path)?;
        let id = Self::document_id_from_path(&file_path);
        self.paths.write().unwrap().insert(id.clone(), file_path);
        Ok(id)
    }

    /// Stop tracking a file. Returns its path if it was tracked.
    pub fn remove_document(&self, id: &DocumentId) -> Option<PathBuf> {
        self.write_locks.lock().unwrap().remove(id);
        self.self_writes.lock().unwrap().forget(id);
        self.paths.write().unwrap().remove(id)
    }

    pub fn path_of(&self, id: &DocumentId) -> Option<PathBuf> {
        self.paths.read().unwrap().get(id).cloned()
    }

    /// All tracked documents, sorted by path.
    pub fn documents(&self) -> Vec<(DocumentId, PathBuf)> {
        let mut docs: Vec<_> = self
            .paths
            .read()
            .unwrap()
            .iter()
            .map(|(id, path)| (id.clone(), path.clone()))
            .collect();
        docs.sort_by(|a, b| a.1.cmp(&b.1));
        docs
    }

    /// Whether the file's current content is the echo of one of our writes.
    /// A match consumes the fingerprint.
    pub fn check_self_write(&self, id: &DocumentId) -> bool {
        let Some(path) = self.path_of(id) else {
            return false;
        };
        match fs::read_to_string(&path) {
            Ok(content) => self
                .self_writes
                .lock()
                .unwrap()
                .check_and_consume(id, &content),
            Err(_) => false,
        }
    }

    /// Run periodic cleanup of expired fingerprints.
    pub fn cleanup_expired_fingerprints(&self) {
        self.self_writes.lock().unwrap().cleanup_expired();
    }

    fn get_write_lock(&self, id: &DocumentId) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn require_path(&self, id: &DocumentId) -> Result<PathBuf, StorageError> {
        self.path_of(id)
            .ok_or_else(|| StorageError::NotTracked(id.clone()))
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    pub fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        let tmp_path = path.with_extension("lanesync.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        // fsync directory for rename durability
        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

impl DocumentHost for LocalFiles {
    fn read(&self, id: &DocumentId) -> Result<String, StorageError> {
        let path = self.require_path(id)?;
        Ok(fs::read_to_string(path)?)
    }

    fn write(&self, id: &DocumentId, text: &str) -> Result<(), StorageError> {
        let lock = self.get_write_lock(id);
        let _guard = lock.lock().unwrap();
        let path = self.require_path(id)?;

        // Non-empty-to-empty protection
        if text.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(&path) {
                if !existing.trim().is_empty() {
                    return Err(StorageError::EmptyOverwrite(id.clone()));
                }
            }
        }

        self.self_writes.lock().unwrap().register(id, text);
        if let Err(e) = Self::atomic_write(&path, text) {
            self.self_writes.lock().unwrap().unregister(id, text);
            return Err(e.into());
        }
        log::debug!("[lanesync.storage.write] Wrote {} ({} bytes)", path.display(), text.len());
        Ok(())
    }

    fn index_ready(&self, id: &DocumentId, text: &str) -> bool {
        let Some(path) = self.path_of(id) else {
            return true;
        };
        fs::read_to_string(path)
            .map(|content| Fingerprint::of(&content) == Fingerprint::of(text))
            .unwrap_or(false)
    }
}
