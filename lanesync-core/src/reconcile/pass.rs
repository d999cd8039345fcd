/// The stages of one reconciliation pass, as pure text -> text functions.
///
/// `reconcile_text` chains them; the orchestrator calls them one by one so
/// it can report its phase in between.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::diff::card_identity::{parse_marker_line, replace_marker_token};
use crate::diff::movement::detect_movements;
use crate::marker_sync::{apply_line_edits, sync_board, sync_cards, LineEdit};
use crate::normalization::{analyze, MarkerChange};
use crate::parser::parse;
use crate::text::split_lines;
use crate::types::{column_key, MarkerPolicy, Movement};

/// Result of a pure reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassResult {
    pub text: String,
    pub movements: Vec<Movement>,
    /// Marker tokens restored by normalization protection.
    pub restored: usize,
    pub changed: bool,
}

/// Step 2: card movements from `previous` to `current`.
pub fn detect_stage(previous: &str, current: &str) -> Vec<Movement> {
    detect_movements(&parse(previous), &parse(current))
}

/// Step 3: give moved cards their destination column's marker.
pub fn sync_moved_stage<'a>(current: &'a str, movements: &[Movement], policy: &MarkerPolicy) -> Cow<'a, str> {
    if movements.is_empty() {
        return Cow::Borrowed(current);
    }
    let moved: HashSet<(&str, String)> = movements
        .iter()
        .map(|m| (m.identity.as_str(), column_key(&m.destination)))
        .collect();
    sync_cards(&parse(current), current, policy, |column, card| {
        moved.contains(&(card.identity.as_str(), column.key()))
    })
}

/// Step 4: put back markers an external editor normalized away. Returns the
/// text and the number of tokens restored.
pub fn protect_stage<'a>(
    previous: &str,
    text: &'a str,
    movements: &[Movement],
    policy: &MarkerPolicy,
) -> (Cow<'a, str>, usize) {
    let report = analyze(previous, text, movements, policy);
    let unwanted: Vec<&MarkerChange> = report.unwanted().collect();
    if unwanted.is_empty() {
        return (Cow::Borrowed(text), 0);
    }
    log::info!(
        "[lanesync.reconcile.protect] Restoring {} normalized markers",
        unwanted.len()
    );
    restore_markers(text, &unwanted)
}

/// Restore each change's previous token on its line, in place.
pub fn restore_markers<'a>(text: &'a str, changes: &[&MarkerChange]) -> (Cow<'a, str>, usize) {
    let lines = split_lines(text);
    let mut edits = Vec::new();

    for change in changes {
        let Some(line) = lines.get(change.line) else {
            continue;
        };
        let still_current = parse_marker_line(line).is_some_and(|parsed| parsed.token == change.current);
        if !still_current {
            log::warn!(
                "[lanesync.reconcile.protect] Line {} no longer carries {}, leaving it",
                change.line,
                change.current
            );
            continue;
        }
        if let Cow::Owned(replacement) = replace_marker_token(line, &change.previous) {
            edits.push(LineEdit {
                start: change.line,
                count: 1,
                replacement,
            });
        }
    }

    if edits.is_empty() {
        return (Cow::Borrowed(text), 0);
    }
    let restored = edits.len();
    (Cow::Owned(apply_line_edits(text, edits)), restored)
}

/// Step 5: full-board convergence pass.
pub fn converge_stage<'a>(text: &'a str, policy: &MarkerPolicy) -> Cow<'a, str> {
    sync_board(&parse(text), text, policy)
}

/// Run steps 2-5 of a pass on two snapshots.
pub fn reconcile_text(previous: &str, current: &str, policy: &MarkerPolicy, protect: bool) -> PassResult {
    let movements = detect_stage(previous, current);
    let moved = sync_moved_stage(current, &movements, policy);

    let (protected, restored) = if protect {
        let (text, restored) = protect_stage(previous, &moved, &movements, policy);
        (text.into_owned(), restored)
    } else {
        (moved.into_owned(), 0)
    };

    let text = converge_stage(&protected, policy).into_owned();
    let changed = text != current;
    PassResult {
        text,
        movements,
        restored,
        changed,
    }
}
