/// Recognizes the watcher echo of the reconciler's own writes.
///
/// The host records a digest of every text it is about to write. When the
/// file changes on disk the current content is digested again; a digest we
/// recorded means the change is ours and is dropped (once). Entries older
/// than `OWN_WRITE_TTL` are swept by `cleanup_expired`.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::text::split_lines;
use crate::types::DocumentId;

const OWN_WRITE_TTL: Duration = Duration::from_secs(10);

/// SHA-256 of a text with `\r\n` read as `\n`, so an editor that flips
/// line endings on save still matches our write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        for line in split_lines(text) {
            match line.strip_suffix('\n') {
                Some(body) => {
                    hasher.update(body.strip_suffix('\r').unwrap_or(body).as_bytes());
                    hasher.update(b"\n");
                }
                None => hasher.update(line.as_bytes()),
            }
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }
}

struct OwnWrite {
    fingerprint: Fingerprint,
    recorded_at: Instant,
}

/// Pending own-write digests, per document.
#[derive(Default)]
pub struct SelfWriteTracker {
    /// Several writes may land before the watcher fires.
    pending: HashMap<DocumentId, Vec<OwnWrite>>,
}

impl SelfWriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the text about to be written.
    pub fn register(&mut self, id: &DocumentId, content: &str) {
        self.pending.entry(id.clone()).or_default().push(OwnWrite {
            fingerprint: Fingerprint::of(content),
            recorded_at: Instant::now(),
        });
    }

    /// Withdraw a registration whose write failed.
    pub fn unregister(&mut self, id: &DocumentId, content: &str) {
        self.take(id, &Fingerprint::of(content));
    }

    /// True (and consumed) when `current_content` matches a pending write.
    pub fn check_and_consume(&mut self, id: &DocumentId, current_content: &str) -> bool {
        self.take(id, &Fingerprint::of(current_content))
    }

    fn take(&mut self, id: &DocumentId, fingerprint: &Fingerprint) -> bool {
        let Some(entries) = self.pending.get_mut(id) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| &e.fingerprint == fingerprint) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.pending.remove(id);
        }
        true
    }

    /// Drop everything pending for a document.
    pub fn forget(&mut self, id: &DocumentId) {
        self.pending.remove(id);
    }

    /// Drop digests whose echo never arrived.
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.recorded_at) < OWN_WRITE_TTL);
            !entries.is_empty()
        });
    }

    pub fn has_pending(&self, id: &DocumentId) -> bool {
        self.pending.get(id).is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_id() -> DocumentId {
        DocumentId::from("board")
    }

    #[test]
    fn test_fingerprint_ignores_line_endings_only() {
        assert_eq!(Fingerprint::of("a\nb\n"), Fingerprint::of("a\r\nb\r\n"));
        assert_ne!(Fingerprint::of("a\nb"), Fingerprint::of("a\nb\n"));
        assert_ne!(Fingerprint::of("- [ ] a\n"), Fingerprint::of("- [x] a\n"));
    }

    #[test]
    fn test_register_and_match() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();
        let content = "## Doing\n- [/] Task 1\n";

        tracker.register(&id, content);
        assert!(tracker.has_pending(&id));
        assert!(tracker.check_and_consume(&id, content));
        assert!(!tracker.has_pending(&id));
    }

    #[test]
    fn test_external_edit_does_not_match() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();

        tracker.register(&id, "## Doing\n- [/] Task\n");
        assert!(!tracker.check_and_consume(&id, "## Doing\n- [x] Task\n"));
        assert!(tracker.has_pending(&id));
    }

    #[test]
    fn test_documents_are_independent() {
        let mut tracker = SelfWriteTracker::new();
        tracker.register(&DocumentId::from("a"), "same");
        assert!(!tracker.check_and_consume(&DocumentId::from("b"), "same"));
        assert!(tracker.check_and_consume(&DocumentId::from("a"), "same"));
    }

    #[test]
    fn test_multiple_writes_same_document() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();

        tracker.register(&id, "content v1");
        tracker.register(&id, "content v2");
        assert!(tracker.check_and_consume(&id, "content v1"));
        assert!(tracker.has_pending(&id));
        assert!(tracker.check_and_consume(&id, "content v2"));
        assert!(!tracker.has_pending(&id));
    }

    #[test]
    fn test_unregister_and_forget() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();

        tracker.register(&id, "failed write");
        tracker.unregister(&id, "failed write");
        assert!(!tracker.has_pending(&id));

        tracker.register(&id, "x");
        tracker.forget(&id);
        assert!(!tracker.has_pending(&id));
    }

    #[test]
    fn test_normalized_line_endings() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();

        tracker.register(&id, "line1\nline2");
        assert!(tracker.check_and_consume(&id, "line1\r\nline2"));
    }

    #[test]
    fn test_cleanup_expired() {
        let mut tracker = SelfWriteTracker::new();
        let id = board_id();

        tracker.register(&id, "content");
        if let Some(entries) = tracker.pending.get_mut(&id) {
            entries[0].recorded_at = Instant::now() - Duration::from_secs(15);
        }

        tracker.cleanup_expired();
        assert!(!tracker.has_pending(&id));
    }
}
