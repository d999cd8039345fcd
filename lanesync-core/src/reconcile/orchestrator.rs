/// Reconciliation orchestrator.
///
/// Sequences detection, protection and synchronization for each tracked
/// document and decides whether to write back. Per-document state lives in a
/// `DocumentStore` owned by the reconciler; a pass for one document never
/// blocks another.
///
/// Passes are never queued: a notification that arrives while the document's
/// pass is in flight, or during the cooldown after our own write, is dropped
/// and the next external change retries.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::context::{DocumentStore, Phase};
use super::pass::{converge_stage, detect_stage, protect_stage, sync_moved_stage};
use super::{PassStatus, ReconcileError, ReconcileOutcome};
use crate::config::SyncSettings;
use crate::normalization::{quick_scan, QuickScan};
use crate::storage::DocumentHost;
use crate::types::{DocumentId, MarkerPolicy};

const INDEX_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Puts a document back to `Phase::Idle` when its pass ends anywhere short
/// of the post-write cooldown: early returns, errors, panics, or the pass
/// future being dropped while it sleeps.
struct PassGuard<'a> {
    store: &'a Mutex<DocumentStore>,
    id: &'a DocumentId,
    armed: bool,
}

impl PassGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = store.get_mut(self.id) {
            ctx.phase = Phase::Idle;
        }
    }
}

pub struct Reconciler<H: DocumentHost> {
    host: H,
    settings: SyncSettings,
    policy: MarkerPolicy,
    store: Mutex<DocumentStore>,
}

impl<H: DocumentHost> Reconciler<H> {
    pub fn new(host: H, settings: SyncSettings) -> Self {
        let policy = settings.marker_policy();
        Self {
            host,
            settings,
            policy,
            store: Mutex::new(DocumentStore::new()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn policy(&self) -> &MarkerPolicy {
        &self.policy
    }

    fn lock_store(&self) -> MutexGuard<'_, DocumentStore> {
        self.store.lock().unwrap()
    }

    /// Start tracking a document with `text` as its baseline.
    pub fn track(&self, id: &DocumentId, text: &str) {
        self.lock_store().entry(id).previous_text = Some(text.to_string());
        log::debug!("[lanesync.reconcile.track] Tracking {}", id);
    }

    /// Stop tracking a document and drop all of its state.
    pub fn untrack(&self, id: &DocumentId) -> bool {
        let removed = self.lock_store().remove(id).is_some();
        if removed {
            log::debug!("[lanesync.reconcile.track] Untracked {}", id);
        }
        removed
    }

    pub fn is_tracked(&self, id: &DocumentId) -> bool {
        self.lock_store().contains(id)
    }

    /// Last text seen (or written) for a document.
    pub fn previous_text(&self, id: &DocumentId) -> Option<String> {
        self.lock_store().get(id).and_then(|ctx| ctx.previous_text.clone())
    }

    pub fn phase(&self, id: &DocumentId) -> Option<Phase> {
        self.lock_store().get(id).map(|ctx| ctx.phase)
    }

    fn set_phase(&self, id: &DocumentId, phase: Phase) {
        if let Some(ctx) = self.lock_store().get_mut(id) {
            ctx.phase = phase;
        }
    }

    /// Statistical normalization check of `text` against the stored baseline,
    /// cheap enough to run before a full pass.
    pub fn preflight(&self, id: &DocumentId, text: &str) -> QuickScan {
        match self.previous_text(id) {
            Some(previous) => quick_scan(&previous, text, &self.policy),
            None => QuickScan::default(),
        }
    }

    /// Read the document from the host and reconcile it.
    pub async fn on_change(&self, id: &DocumentId) -> Result<ReconcileOutcome, ReconcileError> {
        let text = self
            .host
            .read(id)
            .map_err(|e| ReconcileError::Read(id.clone(), e))?;
        self.reconcile(id, &text).await
    }

    /// Run one reconciliation pass for an observed change of `id` to `current`.
    pub async fn reconcile(&self, id: &DocumentId, current: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let previous = {
            let mut store = self.lock_store();
            let ctx = store.entry(id);
            if ctx.is_busy(Instant::now()) {
                log::debug!("[lanesync.reconcile.busy] Dropping notification for {} ({:?})", id, ctx.phase);
                return Ok(ReconcileOutcome::unchanged(current, PassStatus::Busy));
            }
            match ctx.previous_text.as_deref() {
                None => {
                    ctx.previous_text = Some(current.to_string());
                    return Ok(ReconcileOutcome::unchanged(current, PassStatus::Baseline));
                }
                Some(previous) if previous == current => {
                    return Ok(ReconcileOutcome::unchanged(current, PassStatus::NoChange));
                }
                Some(previous) => {
                    let previous = previous.to_string();
                    ctx.phase = Phase::Detecting;
                    previous
                }
            }
        };
        let guard = PassGuard {
            store: &self.store,
            id,
            armed: true,
        };

        // A likely normalization turns protection on even when it is
        // disabled in the settings.
        let scan = quick_scan(&previous, current, &self.policy);
        if scan.likely_normalization {
            log::info!(
                "[lanesync.reconcile.preflight] {} looks normalized ({} of {} marker changes)",
                id,
                scan.conversions,
                scan.total_changes
            );
        }
        let protect = self.settings.protect_normalization || scan.likely_normalization;

        let movements = detect_stage(&previous, current);
        self.set_phase(id, Phase::Syncing);
        let moved = sync_moved_stage(current, &movements, &self.policy);

        let (protected, restored) = if protect {
            self.set_phase(id, Phase::Protecting);
            let (text, restored) = protect_stage(&previous, &moved, &movements, &self.policy);
            (text.into_owned(), restored)
        } else {
            (moved.into_owned(), 0)
        };

        self.set_phase(id, Phase::Syncing);
        let result = converge_stage(&protected, &self.policy).into_owned();

        if result == current {
            if let Some(ctx) = self.lock_store().get_mut(id) {
                ctx.previous_text = Some(current.to_string());
            }
            return Ok(ReconcileOutcome::unchanged(current, PassStatus::InSync));
        }

        let last_write = self.lock_store().get(id).and_then(|ctx| ctx.last_write);
        if let Some(last_write) = last_write {
            let wait = self.settings.min_write_interval().saturating_sub(last_write.elapsed());
            if !wait.is_zero() {
                log::debug!("[lanesync.reconcile.throttle] Delaying write of {} by {:?}", id, wait);
                tokio::time::sleep(wait).await;
            }
        }

        self.set_phase(id, Phase::Writing { release_at: None });
        if let Err(source) = self.host.write(id, &result) {
            log::error!("[lanesync.reconcile.write] Write of {} failed: {}", id, source);
            return Err(ReconcileError::WriteFailed {
                id: id.clone(),
                fallback: current.to_string(),
                source,
            });
        }
        log::info!(
            "[lanesync.reconcile.write] Wrote {} ({} movements, {} markers restored)",
            id,
            movements.len(),
            restored
        );

        self.wait_for_index(id, &result).await;

        let now = Instant::now();
        let release_at = now.checked_add(self.settings.cooldown());
        if release_at.is_none() {
            log::warn!(
                "[lanesync.reconcile.cooldown] Cooldown of {:?} out of range, releasing {} now",
                self.settings.cooldown(),
                id
            );
        }
        if let Some(ctx) = self.lock_store().get_mut(id) {
            ctx.previous_text = Some(result.clone());
            ctx.last_write = Some(now);
            ctx.phase = match release_at {
                Some(release_at) => Phase::Writing {
                    release_at: Some(release_at),
                },
                None => Phase::Idle,
            };
        }
        guard.disarm();

        Ok(ReconcileOutcome {
            text: result,
            changed: true,
            status: PassStatus::Written {
                movements: movements.len(),
                restored,
            },
        })
    }

    /// Wait until the host reflects `text`, up to the configured soft deadline.
    async fn wait_for_index(&self, id: &DocumentId, text: &str) {
        let poll = async {
            while !self.host.index_ready(id, text) {
                tokio::time::sleep(INDEX_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(self.settings.index_wait(), poll).await.is_err() {
            log::debug!(
                "[lanesync.reconcile.index] {} not reflected after {:?}, continuing",
                id,
                self.settings.index_wait()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryHost;
    use crate::types::PolicyEntry;
    use std::sync::Arc;

    fn settings(policy: &[(&str, &str)]) -> SyncSettings {
        SyncSettings {
            policy: policy
                .iter()
                .map(|(column, marker)| PolicyEntry {
                    column: column.to_string(),
                    marker: marker.to_string(),
                })
                .collect(),
            cooldown_ms: 200,
            min_write_interval_ms: 500,
            index_wait_ms: 100,
            ..SyncSettings::default()
        }
    }

    fn reconciler(policy: &[(&str, &str)]) -> (Arc<MemoryHost>, Reconciler<Arc<MemoryHost>>) {
        let host = Arc::new(MemoryHost::new());
        let reconciler = Reconciler::new(host.clone(), settings(policy));
        (host, reconciler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_is_baseline() {
        let (host, reconciler) = reconciler(&[]);
        let id = DocumentId::from("board");
        let outcome = reconciler.reconcile(&id, "## Todo\n- [x] a\n").await.unwrap();
        assert_eq!(outcome.status, PassStatus::Baseline);
        assert!(!outcome.changed);
        assert!(reconciler.is_tracked(&id));
        assert_eq!(host.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_text_is_noop() {
        let (_host, reconciler) = reconciler(&[]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Todo\n");
        let outcome = reconciler.reconcile(&id, "## Todo\n").await.unwrap();
        assert_eq!(outcome.status, PassStatus::NoChange);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_is_written_and_baseline_updated() {
        let (host, reconciler) = reconciler(&[("A", "[ ]"), ("B", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## A\n- [ ] Foo\n  details\n## B\n");

        let outcome = reconciler
            .reconcile(&id, "## A\n## B\n- [ ] Foo\n  details\n")
            .await
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.text, "## A\n## B\n- [/] Foo\n  details\n");
        assert_eq!(
            outcome.status,
            PassStatus::Written {
                movements: 1,
                restored: 0
            }
        );
        assert_eq!(host.get(&id).as_deref(), Some(outcome.text.as_str()));
        assert_eq!(reconciler.previous_text(&id).as_deref(), Some(outcome.text.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_drops_echo_then_releases() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");

        reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        assert_eq!(host.write_count(), 1);
        assert!(matches!(reconciler.phase(&id), Some(Phase::Writing { .. })));

        let busy = reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        assert_eq!(busy.status, PassStatus::Busy);
        assert_eq!(busy.text, "## Doing\n- [x] Foo\n");

        tokio::time::advance(Duration::from_millis(250)).await;
        let echo = reconciler.reconcile(&id, "## Doing\n- [/] Foo\n").await.unwrap();
        assert_eq!(echo.status, PassStatus::NoChange);
        assert_eq!(reconciler.phase(&id), Some(Phase::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_writes_are_throttled() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");

        reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        let first_write = Instant::now();
        tokio::time::advance(Duration::from_millis(250)).await;

        reconciler.reconcile(&id, "## Doing\n- [/] Foo\n- [x] Bar\n").await.unwrap();
        assert_eq!(host.write_count(), 2);
        assert!(first_write.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pass_releases_document() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");
        reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        tokio::time::advance(Duration::from_millis(250)).await;

        // The throttle still has ~250ms to sleep; give up after 100ms.
        let edited = "## Doing\n- [/] Foo\n- [x] Bar\n";
        let cancelled = tokio::time::timeout(Duration::from_millis(100), reconciler.reconcile(&id, edited)).await;
        assert!(cancelled.is_err());
        assert_eq!(host.write_count(), 1);
        assert_eq!(reconciler.phase(&id), Some(Phase::Idle));

        let outcome = reconciler.reconcile(&id, edited).await.unwrap();
        assert_ne!(outcome.status, PassStatus::Busy);
        assert_eq!(outcome.text, "## Doing\n- [/] Foo\n- [/] Bar\n");
        assert_eq!(host.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_is_clamped() {
        let host = Arc::new(MemoryHost::new());
        let settings = SyncSettings {
            cooldown_ms: u64::MAX,
            ..settings(&[("Doing", "[/]")])
        };
        let reconciler = Reconciler::new(host, settings);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");

        reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        assert!(matches!(reconciler.phase(&id), Some(Phase::Writing { release_at: Some(_) })));

        tokio::time::advance(Duration::from_millis(crate::config::MAX_DELAY_MS + 1)).await;
        let outcome = reconciler.reconcile(&id, "## Doing\n- [/] Foo\n").await.unwrap();
        assert_eq!(outcome.status, PassStatus::NoChange);
    }

    #[tokio::test(start_paused = true)]
    async fn test_likely_normalization_protects_when_disabled() {
        let host = Arc::new(MemoryHost::new());
        let settings = SyncSettings {
            protect_normalization: false,
            ..settings(&[("Doing", "[/]")])
        };
        let reconciler = Reconciler::new(host, settings);
        let id = DocumentId::from("board");
        let previous = "## Doing\n- [/] a\n- [/] b\n";
        reconciler.track(&id, previous);

        let outcome = reconciler.reconcile(&id, "## Doing\n- [x] a\n- [x] b\n").await.unwrap();
        assert_eq!(outcome.text, previous);
        assert_eq!(
            outcome.status,
            PassStatus::Written {
                movements: 0,
                restored: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_change_unprotected_when_disabled() {
        let host = Arc::new(MemoryHost::new());
        let settings = SyncSettings {
            protect_normalization: false,
            ..settings(&[("Doing", "[/]")])
        };
        let reconciler = Reconciler::new(host, settings);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] a\n- [ ] b\n- [ ] c\n");

        // One conversion out of three marker changes is not a likely normalization.
        let outcome = reconciler
            .reconcile(&id, "## Doing\n- [x] a\n- [>] b\n- [>] c\n")
            .await
            .unwrap();
        assert_eq!(
            outcome.status,
            PassStatus::Written {
                movements: 0,
                restored: 0
            }
        );
    }

    /// Host whose index never catches up with a write.
    struct LaggingHost(MemoryHost);

    impl DocumentHost for LaggingHost {
        fn read(&self, id: &DocumentId) -> Result<String, crate::storage::StorageError> {
            self.0.read(id)
        }

        fn write(&self, id: &DocumentId, text: &str) -> Result<(), crate::storage::StorageError> {
            self.0.write(id, text)
        }

        fn index_ready(&self, _id: &DocumentId, _text: &str) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_wait_is_a_soft_deadline() {
        let reconciler = Reconciler::new(LaggingHost(MemoryHost::new()), settings(&[("Doing", "[/]")]));
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");

        let started = Instant::now();
        let outcome = reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap();
        assert!(outcome.changed);
        assert!(matches!(outcome.status, PassStatus::Written { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(reconciler.host().0.write_count(), 1);
        assert_eq!(reconciler.previous_text(&id).as_deref(), Some("## Doing\n- [/] Foo\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_returns_original_text() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");
        host.set_reject_writes(true);

        let err = reconciler.reconcile(&id, "## Doing\n- [x] Foo\n").await.unwrap_err();
        match err {
            ReconcileError::WriteFailed { fallback, .. } => assert_eq!(fallback, "## Doing\n- [x] Foo\n"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(reconciler.phase(&id), Some(Phase::Idle));
        assert_eq!(reconciler.previous_text(&id).as_deref(), Some("## Doing\n- [/] Foo\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_documents_do_not_block_each_other() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let a = DocumentId::from("a");
        let b = DocumentId::from("b");
        reconciler.track(&a, "## Doing\n- [/] Foo\n");
        reconciler.track(&b, "## Doing\n- [/] Foo\n");

        reconciler.reconcile(&a, "## Doing\n- [x] Foo\n").await.unwrap();
        let outcome = reconciler.reconcile(&b, "## Doing\n- [x] Foo\n").await.unwrap();
        assert!(outcome.changed);
        assert_eq!(host.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untrack_clears_state() {
        let (_host, reconciler) = reconciler(&[]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Todo\n");
        assert!(reconciler.untrack(&id));
        assert!(!reconciler.is_tracked(&id));
        assert!(!reconciler.untrack(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_change_reads_from_host() {
        let (host, reconciler) = reconciler(&[("Doing", "[/]")]);
        let id = DocumentId::from("board");
        reconciler.track(&id, "## Doing\n- [/] Foo\n");
        host.insert(&id, "## Doing\n- [x] Foo\n");

        let outcome = reconciler.on_change(&id).await.unwrap();
        assert_eq!(outcome.text, "## Doing\n- [/] Foo\n");
        assert_eq!(host.get(&id).as_deref(), Some("## Doing\n- [/] Foo\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_uses_stored_baseline() {
        let (_host, reconciler) = reconciler(&[]);
        let id = DocumentId::from("board");
        assert!(!reconciler.preflight(&id, "- [x] a\n").likely_normalization);

        reconciler.track(&id, "## Doing\n- [/] a\n- [>] b\n");
        let scan = reconciler.preflight(&id, "## Doing\n- [x] a\n- [x] b\n");
        assert_eq!(scan.conversions, 2);
        assert!(scan.likely_normalization);
    }
}
