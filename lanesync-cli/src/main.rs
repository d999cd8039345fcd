//! lanesync - keeps task markers on markdown boards in step with their columns.

mod config;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lanesync_core::parser::looks_like_board_with;
use lanesync_core::storage::local::LocalFiles;
use lanesync_core::text::split_lines;
use lanesync_core::watcher::file_watcher::FileWatcher;
use lanesync_core::watcher::types::{DocumentEvent, FileChange};
use lanesync_core::{
    detect_movements_in_text, parse, sync_board, DocumentHost, DocumentId, MarkerPolicy, PassStatus, Reconciler,
    StorageError, SyncSettings,
};
use tokio::sync::broadcast::error::RecvError;

use config::CliConfig;

const FINGERPRINT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "lanesync")]
#[command(about = "Keep markdown board task markers in sync with their columns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/lanesync/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report board structure and markers that disagree with the policy
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print card movements between two versions of a board as JSON
    Diff { old: PathBuf, new: PathBuf },

    /// Rewrite every card marker to match its column
    Sync {
        file: PathBuf,

        /// Print the result instead of writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Reconcile boards whenever they change on disk
    Watch {
        /// Boards to watch (defaults to the documents listed in the config)
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("File watcher error: {0}")]
    Watch(String),

    #[error("{0} file(s) have markers out of sync")]
    OutOfSync(usize),

    #[error("No boards to watch")]
    NothingToWatch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);

    let result = match cli.command {
        Commands::Check { files } => check(&files, &config.sync),
        Commands::Diff { old, new } => diff(&old, &new),
        Commands::Sync { file, dry_run } => sync(&file, dry_run, &config.sync),
        Commands::Watch { files } => watch(files, &config, &config_path).await,
    };

    if let Err(e) = result {
        log::error!("[lanesync.cli] {}", e);
        std::process::exit(1);
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn is_board(text: &str, settings: &SyncSettings) -> bool {
    looks_like_board_with(text, &settings.board_key, &settings.workflow_words)
}

/// Number of lines a full-board sync would rewrite.
fn out_of_sync_lines(text: &str, policy: &MarkerPolicy) -> usize {
    match sync_board(&parse(text), text, policy) {
        Cow::Borrowed(_) => 0,
        Cow::Owned(synced) => split_lines(text)
            .into_iter()
            .zip(split_lines(&synced))
            .filter(|(a, b)| a != b)
            .count(),
    }
}

fn check(files: &[PathBuf], settings: &SyncSettings) -> Result<(), CliError> {
    let policy = settings.marker_policy();
    let mut out_of_sync = 0;

    for path in files {
        let text = read_file(path)?;
        if !is_board(&text, settings) {
            println!("{}: not a board", path.display());
            continue;
        }

        let board = parse(&text);
        println!(
            "{}: {} columns, {} cards",
            path.display(),
            board.columns.len(),
            board.card_count()
        );
        for column in &board.columns {
            println!(
                "  {:<24} {:>4} cards  {}",
                column.title,
                column.cards.len(),
                policy.marker_for(&column.title)
            );
        }

        let stale = out_of_sync_lines(&text, &policy);
        if stale > 0 {
            println!("  {} markers out of sync", stale);
            out_of_sync += 1;
        }
    }

    if out_of_sync > 0 {
        return Err(CliError::OutOfSync(out_of_sync));
    }
    Ok(())
}

fn diff(old: &Path, new: &Path) -> Result<(), CliError> {
    let movements = detect_movements_in_text(&read_file(old)?, &read_file(new)?);
    println!("{}", serde_json::to_string_pretty(&movements)?);
    Ok(())
}

fn sync(path: &Path, dry_run: bool, settings: &SyncSettings) -> Result<(), CliError> {
    let text = read_file(path)?;
    if !is_board(&text, settings) {
        log::warn!("[lanesync.cli.sync] {} does not look like a board, skipping", path.display());
        return Ok(());
    }

    let policy = settings.marker_policy();
    let synced = match sync_board(&parse(&text), &text, &policy) {
        Cow::Borrowed(_) => {
            log::info!("[lanesync.cli.sync] {} already in sync", path.display());
            return Ok(());
        }
        Cow::Owned(synced) => synced,
    };

    if dry_run {
        print!("{}", synced);
        return Ok(());
    }

    LocalFiles::atomic_write(path, &synced).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("[lanesync.cli.sync] Updated {}", path.display());
    Ok(())
}

async fn watch(files: Vec<PathBuf>, config: &CliConfig, config_path: &Path) -> Result<(), CliError> {
    let paths: Vec<PathBuf> = if files.is_empty() {
        config
            .documents
            .iter()
            .map(|entry| config::resolve_document_path(&entry.file, config_path))
            .collect()
    } else {
        files
    };

    let host = Arc::new(LocalFiles::new());
    let reconciler = Arc::new(Reconciler::new(host.clone(), config.sync.clone()));
    let (mut watcher, mut event_rx) = FileWatcher::new().map_err(|e| CliError::Watch(e.to_string()))?;

    for path in &paths {
        let id = match host.add_document(path) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("[lanesync.cli.watch] Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let text = host.read(&id)?;
        if !is_board(&text, &config.sync) {
            log::warn!("[lanesync.cli.watch] {} does not look like a board, skipping", path.display());
            host.remove_document(&id);
            continue;
        }
        reconciler.track(&id, &text);
        if let Err(e) = watcher.watch_document(&id, path) {
            log::warn!("[lanesync.cli.watch] Failed to watch {}: {}", path.display(), e);
        }
    }

    if host.documents().is_empty() {
        return Err(CliError::NothingToWatch);
    }
    log::info!("[lanesync.cli.watch] Watching {} boards", host.documents().len());

    let mut cleanup = tokio::time::interval(FINGERPRINT_CLEANUP_INTERVAL);
    loop {
        tokio::select! {
            result = event_rx.recv() => {
                match result {
                    Ok(event) => handle_event(event, &host, &reconciler),
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("[lanesync.cli.watch] Lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => {
                        log::info!("[lanesync.cli.watch] Event channel closed");
                        break;
                    }
                }
            }
            _ = cleanup.tick() => {
                host.cleanup_expired_fingerprints();
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[lanesync.cli.watch] Shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

type FileReconciler = Reconciler<Arc<LocalFiles>>;

fn display_path(host: &LocalFiles, id: &DocumentId) -> String {
    host.path_of(id)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| id.to_string())
}

fn handle_event(event: DocumentEvent, host: &Arc<LocalFiles>, reconciler: &Arc<FileReconciler>) {
    let DocumentEvent { id, change } = event;

    if change == FileChange::Removed {
        // Save-by-rename: the file is often back by the time the debounced
        // removal arrives.
        if host.read(&id).is_err() {
            if reconciler.untrack(&id) {
                log::info!(
                    "[lanesync.cli.watch] {} removed, waiting for it to reappear",
                    display_path(host, &id)
                );
            }
            return;
        }
    }

    if host.check_self_write(&id) {
        log::debug!("[lanesync.cli.watch] Suppressed self-write for {}", id);
        return;
    }

    if reconciler.is_tracked(&id) {
        spawn_reconcile(id, reconciler.clone());
        return;
    }

    // Back after a removal: its content becomes the new baseline.
    if change == FileChange::Created {
        match host.read(&id) {
            Ok(text) => {
                reconciler.track(&id, &text);
                log::info!("[lanesync.cli.watch] {} recreated, tracking again", display_path(host, &id));
            }
            Err(e) => log::warn!("[lanesync.cli.watch] Failed to read {}: {}", display_path(host, &id), e),
        }
    }
}

/// Documents reconcile independently; a throttled write on one board must not
/// hold up events for another.
fn spawn_reconcile(id: DocumentId, reconciler: Arc<FileReconciler>) {
    tokio::spawn(async move {
        match reconciler.on_change(&id).await {
            Ok(outcome) => match outcome.status {
                PassStatus::Written { movements, restored } => log::info!(
                    "[lanesync.cli.watch] Reconciled {}: {} moved, {} restored",
                    id,
                    movements,
                    restored
                ),
                PassStatus::Busy => log::debug!("[lanesync.cli.watch] {} busy, change dropped", id),
                _ => {}
            },
            Err(e) => log::warn!("[lanesync.cli.watch] {}", e),
        }
    });
}
