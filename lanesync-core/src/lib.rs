pub mod config;
pub mod diff;
pub mod marker_sync;
pub mod normalization;
pub mod parser;
pub mod reconcile;
pub mod storage;
pub mod text;
pub mod types;
pub mod watcher;

pub use config::SyncSettings;
pub use diff::{detect_movements, detect_movements_in_text};
pub use marker_sync::{sync_board, sync_cards};
pub use normalization::{analyze, quick_scan, ChangeKind, NormalizationReport, QuickScan};
pub use parser::{looks_like_board, parse};
pub use reconcile::{reconcile_text, PassStatus, ReconcileError, ReconcileOutcome, Reconciler};
pub use storage::{DocumentHost, StorageError};
pub use types::{Board, Card, Column, DocumentId, MarkerPolicy, Movement, PolicyEntry};
