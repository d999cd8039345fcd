/// Detection of unwanted marker normalization.
///
/// Some editors rewrite custom markers (`[/]`, `[>]`, ...) back to a standard
/// one when they render or save a board. This module tells those regressions
/// apart from marker changes that come with a genuine column move.

use serde::Serialize;

use crate::diff::alignment::align_lines;
use crate::diff::card_identity::{identity_key, line_shape, parse_marker_line};
use crate::text::{split_lines, tag_columns};
use crate::types::{column_key, MarkerPolicy, Movement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// The card moved into this column and now carries the column's marker.
    Legitimate,
    /// The column's marker was replaced by the complete marker without a move.
    UnwantedNormalization,
    /// Any other marker edit; left to the synchronizer.
    Other,
}

/// A marker token that differs between two aligned lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerChange {
    pub previous_line: usize,
    /// Line index in the current text.
    pub line: usize,
    pub column: Option<String>,
    pub identity: String,
    pub previous: String,
    pub current: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationReport {
    pub changes: Vec<MarkerChange>,
    /// True when the snapshots were too far apart for LCS alignment.
    pub index_paired: bool,
}

impl NormalizationReport {
    pub fn unwanted(&self) -> impl Iterator<Item = &MarkerChange> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::UnwantedNormalization)
    }

    pub fn has_unwanted(&self) -> bool {
        self.unwanted().next().is_some()
    }
}

/// Classify every marker change between `previous` and `current`.
pub fn analyze(
    previous: &str,
    current: &str,
    movements: &[Movement],
    policy: &MarkerPolicy,
) -> NormalizationReport {
    let old_lines = split_lines(previous);
    let new_lines = split_lines(current);
    let old_shapes: Vec<_> = old_lines.iter().map(|l| line_shape(l)).collect();
    let new_shapes: Vec<_> = new_lines.iter().map(|l| line_shape(l)).collect();

    let alignment = align_lines(&old_shapes, &new_shapes);
    if alignment.fell_back {
        log::info!(
            "[lanesync.normalization.align] Documents too far apart ({} vs {} lines), pairing by index",
            old_lines.len(),
            new_lines.len()
        );
    }

    let columns = tag_columns(&new_lines);
    let mut report = NormalizationReport {
        changes: Vec::new(),
        index_paired: alignment.fell_back,
    };

    for (old_index, new_index) in alignment.pairs {
        let (Some(before), Some(after)) = (
            parse_marker_line(old_lines[old_index]),
            parse_marker_line(new_lines[new_index]),
        ) else {
            continue;
        };
        if before.token == after.token {
            continue;
        }

        let column = columns[new_index];
        let kind = match column {
            Some(column) => classify(column, before.token, after.token, movements, policy),
            None => ChangeKind::Other,
        };

        report.changes.push(MarkerChange {
            previous_line: old_index,
            line: new_index,
            column: column.map(str::to_string),
            identity: identity_key(new_lines[new_index]),
            previous: before.token.to_string(),
            current: after.token.to_string(),
            kind,
        });
    }

    report
}

fn classify(
    column: &str,
    previous: &str,
    current: &str,
    movements: &[Movement],
    policy: &MarkerPolicy,
) -> ChangeKind {
    let target = policy.marker_for(column);
    let key = column_key(column);

    let moved_here = movements.iter().any(|m| column_key(&m.destination) == key);
    if moved_here && current == target {
        return ChangeKind::Legitimate;
    }

    if previous == target && current == policy.complete && target != policy.complete {
        return ChangeKind::UnwantedNormalization;
    }

    ChangeKind::Other
}

/// Outcome of the statistical pre-write check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickScan {
    /// Custom marker -> complete marker conversions.
    pub conversions: usize,
    /// All marker changes among paired lines.
    pub total_changes: usize,
    pub likely_normalization: bool,
}

/// Cheap index-paired scan used before movement detection has run.
///
/// Flags the edit as likely normalization when at least two custom markers
/// turned into the complete marker, or when such conversions make up at
/// least half of all marker changes.
pub fn quick_scan(previous: &str, current: &str, policy: &MarkerPolicy) -> QuickScan {
    let mut scan = QuickScan::default();

    for (old_line, new_line) in previous.lines().zip(current.lines()) {
        let (Some(before), Some(after)) = (parse_marker_line(old_line), parse_marker_line(new_line)) else {
            continue;
        };
        if before.token == after.token {
            continue;
        }
        scan.total_changes += 1;
        if policy.is_custom(before.token) && after.token == policy.complete {
            scan.conversions += 1;
        }
    }

    scan.likely_normalization = scan.conversions >= 2
        || (scan.conversions > 0 && scan.conversions * 2 >= scan.total_changes);
    scan
}
