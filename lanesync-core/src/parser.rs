/// Lightweight parser for column/card boards.
///
/// Handles the format:
///   ## Column Title
///   - [ ] Card summary
///     continuation line
///
/// Text before the first heading and stray top-level lines are kept as
/// verbatim segments so `Board::to_text` reproduces the input exactly.

use crate::diff::card_identity;
use crate::text::{heading_title, is_continuation, is_list_item, split_lines};
use crate::types::{Board, Card, Column, Segment};

/// Front matter key that marks a document as a board regardless of headings.
pub const DEFAULT_BOARD_KEY: &str = "kanban-plugin";

/// Heading names treated as workflow columns by `looks_like_board`.
pub const DEFAULT_WORKFLOW_WORDS: &[&str] = &[
    "todo",
    "to do",
    "to-do",
    "backlog",
    "doing",
    "in progress",
    "wip",
    "review",
    "in review",
    "blocked",
    "waiting",
    "done",
    "complete",
    "completed",
    "finished",
    "next",
    "later",
    "archive",
];

/// Card being collected while scanning.
struct PendingCard {
    column: usize,
    start_line: usize,
    line_count: usize,
    raw: String,
}

impl PendingCard {
    fn finish(self, board: &mut Board) {
        let first_line = self.raw.split_inclusive('\n').next().unwrap_or("");
        let card = Card {
            identity: card_identity::identity_key(&self.raw),
            marker: card_identity::extract_marker(first_line),
            raw: self.raw,
            start_line: self.start_line,
            line_count: self.line_count,
        };
        let column = &mut board.columns[self.column];
        column.cards.push(card);
        board.segments.push(Segment::Card {
            column: self.column,
            index: column.cards.len() - 1,
        });
    }
}

fn flush_text(board: &mut Board, pending: &mut String) {
    if !pending.is_empty() {
        board.segments.push(Segment::Text {
            text: std::mem::take(pending),
        });
    }
}

/// Parse board text. Never fails: malformed input yields a partial board.
pub fn parse(text: &str) -> Board {
    let mut board = Board::default();
    let mut current_column: Option<usize> = None;
    let mut current_card: Option<PendingCard> = None;
    let mut verbatim = String::new();

    for (i, line) in split_lines(text).into_iter().enumerate() {
        if let Some(card) = current_card.as_mut() {
            if is_continuation(line) {
                card.raw.push_str(line);
                card.line_count += 1;
                continue;
            }
            if let Some(card) = current_card.take() {
                card.finish(&mut board);
            }
        }

        if let Some(title) = heading_title(line) {
            current_column = Some(match board.column_index(title) {
                Some(existing) => existing,
                None => {
                    board.columns.push(Column {
                        title: title.to_string(),
                        cards: Vec::new(),
                    });
                    board.columns.len() - 1
                }
            });
            verbatim.push_str(line);
            continue;
        }

        if let (Some(column), true) = (current_column, is_list_item(line)) {
            flush_text(&mut board, &mut verbatim);
            current_card = Some(PendingCard {
                column,
                start_line: i,
                line_count: 1,
                raw: line.to_string(),
            });
            continue;
        }

        verbatim.push_str(line);
    }

    if let Some(card) = current_card.take() {
        card.finish(&mut board);
    }
    flush_text(&mut board, &mut verbatim);

    board
}

/// YAML front matter block (between the leading `---` fences), if any.
fn front_matter(text: &str) -> Option<Vec<&str>> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }
    let mut body = Vec::new();
    for line in lines {
        if line.trim_end() == "---" {
            return Some(body);
        }
        body.push(line);
    }
    None
}

/// Heuristic board detection with the default structural key and vocabulary.
pub fn looks_like_board(text: &str) -> bool {
    looks_like_board_with(text, DEFAULT_BOARD_KEY, DEFAULT_WORKFLOW_WORDS)
}

/// A document is a board when its front matter carries `board_key`, or when
/// at least two of its `## ` headings are workflow words.
pub fn looks_like_board_with<S: AsRef<str>>(text: &str, board_key: &str, words: &[S]) -> bool {
    if let Some(header) = front_matter(text) {
        let has_key = header.iter().any(|line| {
            line.split_once(':')
                .map(|(key, _)| key.trim() == board_key)
                .unwrap_or(false)
        });
        if has_key {
            return true;
        }
    }

    let workflow_headings = text
        .lines()
        .filter_map(heading_title)
        .filter(|title| {
            let title = title.to_lowercase();
            words.iter().any(|w| w.as_ref().eq_ignore_ascii_case(&title))
        })
        .count();
    workflow_headings >= 2
}
