/// Debounced watcher over tracked board files.
///
/// notify watches the directory holding each board (non-recursively, so
/// save-by-rename is seen); events for files that are not boards are
/// discarded. Surviving events go out on a broadcast channel as
/// `DocumentEvent`s. The debouncer folds the bursts editors produce on save.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::types::{DocumentEvent, FileChange};
use crate::types::DocumentId;

const DEBOUNCE: Duration = Duration::from_millis(500);
const CHANNEL_CAPACITY: usize = 256;

/// Which paths are boards, and which directories notify already covers.
#[derive(Debug, Default)]
struct WatchTable {
    boards: HashMap<PathBuf, DocumentId>,
    dirs: HashSet<PathBuf>,
}

impl WatchTable {
    fn lookup(&self, path: &Path) -> Option<&DocumentId> {
        self.boards.get(&canonical(path))
    }
}

pub struct FileWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    table: Arc<RwLock<WatchTable>>,
    events: broadcast::Sender<DocumentEvent>,
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Document-level meaning of a notify event, if it has one.
fn classify(kind: &EventKind) -> Option<FileChange> {
    match kind {
        EventKind::Create(_) => Some(FileChange::Created),
        EventKind::Remove(_) => Some(FileChange::Removed),
        EventKind::Modify(_) | EventKind::Any => Some(FileChange::Modified),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

impl FileWatcher {
    /// Start the watcher. Returns it together with a first subscriber.
    pub fn new() -> Result<(Self, broadcast::Receiver<DocumentEvent>), notify::Error> {
        let (events, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let table = Arc::new(RwLock::new(WatchTable::default()));

        let sender = events.clone();
        let lookup = table.clone();
        let debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            let batch = match result {
                Ok(batch) => batch,
                Err(errors) => {
                    for e in errors {
                        log::error!("[lanesync.watcher.notify] {}", e);
                    }
                    return;
                }
            };
            let table = lookup.read().unwrap();
            for event in batch {
                let Some(change) = classify(&event.kind) else {
                    continue;
                };
                for path in &event.paths {
                    if let Some(id) = table.lookup(path) {
                        // Err only means nobody is subscribed right now.
                        let _ = sender.send(DocumentEvent::new(id.clone(), change));
                    }
                }
            }
        })?;

        Ok((
            Self {
                debouncer,
                table,
                events,
            },
            receiver,
        ))
    }

    /// Report changes to `path` as events for `id`.
    pub fn watch_document(&mut self, id: &DocumentId, path: &Path) -> Result<(), notify::Error> {
        let path = canonical(path);
        let dir = path.parent().map(Path::to_path_buf);

        let needs_watch = {
            let mut table = self.table.write().unwrap();
            table.boards.insert(path.clone(), id.clone());
            match &dir {
                Some(dir) => table.dirs.insert(dir.clone()),
                None => false,
            }
        };
        if let (true, Some(dir)) = (needs_watch, dir) {
            if let Err(e) = self.debouncer.watch(&dir, RecursiveMode::NonRecursive) {
                self.table.write().unwrap().dirs.remove(&dir);
                return Err(e);
            }
        }
        log::info!("[lanesync.watcher.track] {} -> {}", path.display(), id);
        Ok(())
    }

    /// Stop reporting `path`. Its directory stays watched.
    pub fn unwatch(&mut self, path: &Path) -> Option<DocumentId> {
        self.table.write().unwrap().boards.remove(&canonical(path))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }
}
