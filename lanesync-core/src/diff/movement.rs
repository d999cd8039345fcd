/// Card movement detection between two board versions.
///
/// Compares per-identity, per-column occurrence counts rather than computing
/// an edit script. Cards with identical text are ambiguous; the source column
/// for such a card is the first column (in board order) that lost an
/// occurrence, which is stable but carries no claim about intent.

use crate::parser::parse;
use crate::types::{Board, Movement};
use std::collections::HashMap;

/// identity -> column key -> occurrence count
type Occurrences<'a> = HashMap<&'a str, HashMap<String, usize>>;

/// Count how often each card identity appears in each column.
pub fn count_occurrences(board: &Board) -> Occurrences<'_> {
    let mut counts: Occurrences<'_> = HashMap::new();
    for (column, _, card) in board.cards() {
        if card.identity.is_empty() {
            continue; // Can't track cards without text
        }
        *counts
            .entry(card.identity.as_str())
            .or_default()
            .entry(column.key())
            .or_insert(0) += 1;
    }
    counts
}

fn count_in(counts: &Occurrences<'_>, identity: &str, column_key: &str) -> usize {
    counts
        .get(identity)
        .and_then(|per_column| per_column.get(column_key))
        .copied()
        .unwrap_or(0)
}

/// Compute card movements from `previous` to `current`.
///
/// One movement is emitted per destination occurrence of an identity that
/// appears in a column it never occupied before, provided the identity
/// existed somewhere in `previous` and some column lost an occurrence of it.
pub fn detect_movements(previous: &Board, current: &Board) -> Vec<Movement> {
    let before = count_occurrences(previous);
    let after = count_occurrences(current);
    let mut movements = Vec::new();

    for column in &current.columns {
        let destination_key = column.key();
        for (index, card) in column.cards.iter().enumerate() {
            let Some(previous_columns) = before.get(card.identity.as_str()) else {
                continue; // New card
            };
            if previous_columns.contains_key(&destination_key) {
                continue;
            }

            let source = previous.columns.iter().find(|candidate| {
                let key = candidate.key();
                count_in(&before, &card.identity, &key) > count_in(&after, &card.identity, &key)
            });

            match source {
                Some(source) => movements.push(Movement {
                    identity: card.identity.clone(),
                    source: source.title.clone(),
                    destination: column.title.clone(),
                    index,
                }),
                None => log::debug!(
                    "[lanesync.diff.movement] '{}' copied into '{}', no column lost it",
                    card.identity,
                    column.title
                ),
            }
        }
    }

    movements
}

/// Parse both texts and detect movements between them.
pub fn detect_movements_in_text(previous: &str, current: &str) -> Vec<Movement> {
    detect_movements(&parse(previous), &parse(current))
}
