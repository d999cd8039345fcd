/// Marker synchronization: rewrite card markers so that every task card
/// carries its column's policy marker.
///
/// Edits are line-range replacements located by column-local card index, so
/// cards with identical text are never confused with each other. Everything
/// outside the replaced marker token is preserved byte for byte.

use std::borrow::Cow;

use crate::diff::card_identity::replace_marker_token;
use crate::parser::parse;
use crate::text::split_lines;
use crate::types::{Board, Card, Column, MarkerPolicy};

/// Rewrite a card's marker token. Returns the raw card unchanged (borrowed)
/// when it has no marker or already carries `target`.
pub fn rewrite_card_marker<'a>(card: &'a Card, target: &str) -> Cow<'a, str> {
    if card.marker.as_deref().map_or(true, |m| m == target) {
        return Cow::Borrowed(&card.raw);
    }
    let first_line = card.first_line();
    match replace_marker_token(first_line, target) {
        Cow::Borrowed(_) => Cow::Borrowed(&card.raw),
        Cow::Owned(mut rewritten) => {
            rewritten.push_str(&card.raw[first_line.len()..]);
            Cow::Owned(rewritten)
        }
    }
}

/// Rewrite every task card whose marker differs from its column's policy
/// marker. Returns `text` itself (borrowed) when nothing needed rewriting.
pub fn sync_board<'a>(board: &Board, text: &'a str, policy: &MarkerPolicy) -> Cow<'a, str> {
    sync_cards(board, text, policy, |_, _| true)
}

/// Like `sync_board`, restricted to cards accepted by `select`.
pub fn sync_cards<'a, F>(board: &Board, text: &'a str, policy: &MarkerPolicy, select: F) -> Cow<'a, str>
where
    F: Fn(&Column, &Card) -> bool,
{
    // Layout of `text` itself; `board` may have been parsed from an older copy.
    let located = parse(text);
    let mut edits: Vec<LineEdit> = Vec::new();

    for column in &board.columns {
        let target = policy.marker_for(&column.title);
        for (index, card) in column.cards.iter().enumerate() {
            match card.marker.as_deref() {
                None => continue,
                Some(marker) if marker == target => continue,
                Some(_) => {}
            }
            if !select(column, card) {
                continue;
            }

            let found = located
                .column(&column.title)
                .and_then(|c| c.cards.get(index));
            let found = match found {
                Some(found) if found.identity == card.identity => found,
                Some(found) => {
                    log::warn!(
                        "[lanesync.sync.skip] Card {} of '{}' is '{}' in the text, expected '{}'",
                        index,
                        column.title,
                        found.identity,
                        card.identity
                    );
                    continue;
                }
                None => {
                    log::warn!(
                        "[lanesync.sync.skip] Card {} of '{}' not found in the text",
                        index,
                        column.title
                    );
                    continue;
                }
            };

            if let Cow::Owned(replacement) = rewrite_card_marker(found, target) {
                edits.push(LineEdit {
                    start: found.start_line,
                    count: found.line_count,
                    replacement,
                });
            }
        }
    }

    if edits.is_empty() {
        return Cow::Borrowed(text);
    }
    log::debug!("[lanesync.sync.apply] Rewriting {} card markers", edits.len());
    Cow::Owned(apply_line_edits(text, edits))
}

/// Replacement of a contiguous line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub start: usize,
    pub count: usize,
    pub replacement: String,
}

/// Apply non-overlapping line-range edits to `text`. Overlapping or
/// out-of-range edits are dropped.
pub fn apply_line_edits(text: &str, mut edits: Vec<LineEdit>) -> String {
    let lines = split_lines(text);
    edits.sort_by_key(|e| e.start);

    let mut out = String::with_capacity(text.len());
    let mut next_line = 0;
    for edit in edits {
        if edit.start < next_line || edit.start + edit.count > lines.len() {
            log::warn!(
                "[lanesync.sync.apply] Dropping edit at line {} (+{})",
                edit.start,
                edit.count
            );
            continue;
        }
        lines[next_line..edit.start].iter().for_each(|l| out.push_str(l));
        out.push_str(&edit.replacement);
        next_line = edit.start + edit.count;
    }
    lines[next_line..].iter().for_each(|l| out.push_str(l));
    out
}
