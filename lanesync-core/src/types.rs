use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker a card carries when its column has no policy entry.
pub const DEFAULT_INCOMPLETE_MARKER: &str = "[ ]";
/// Marker an external editor writes when it "completes" a card.
pub const DEFAULT_COMPLETE_MARKER: &str = "[x]";

/// Stable identity of a tracked document (a path, a URI, a database key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Case-insensitive identity of a column name.
pub fn column_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One list item plus its continuation lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// All lines of the card, terminators included.
    pub raw: String,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Zero-based line of the card's first line in the parsed text.
    pub start_line: usize,
    pub line_count: usize,
}

impl Card {
    /// The card's first line, terminator included.
    pub fn first_line(&self) -> &str {
        match self.raw.find('\n') {
            Some(end) => &self.raw[..=end],
            None => &self.raw,
        }
    }

    /// Cards without a bracketed marker are plain notes, not tasks.
    pub fn is_task(&self) -> bool {
        self.marker.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Heading text as first written, original casing preserved.
    pub title: String,
    pub cards: Vec<Card>,
}

impl Column {
    pub fn key(&self) -> String {
        column_key(&self.title)
    }
}

/// Piece of the source text, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Segment {
    /// Lines that belong to no card (headings, preamble, stray text).
    Text { text: String },
    /// A card, by column position and column-local index.
    Card { column: usize, index: usize },
}

/// Parsed column/card structure of a document. A pure value derived from
/// text; it carries no session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

impl Board {
    /// Look up a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let key = column_key(name);
        self.columns.iter().position(|c| c.key() == key)
    }

    /// Every card with its column, in document order per column.
    pub fn cards(&self) -> impl Iterator<Item = (&Column, usize, &Card)> {
        self.columns
            .iter()
            .flat_map(|col| col.cards.iter().enumerate().map(move |(i, card)| (col, i, card)))
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    /// Serialize the board back to text. Unmodified boards reproduce the
    /// parsed input byte for byte.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text { text } => out.push_str(text),
                Segment::Card { column, index } => {
                    if let Some(card) = self.columns.get(*column).and_then(|c| c.cards.get(*index)) {
                        out.push_str(&card.raw);
                    }
                }
            }
        }
        out
    }
}

/// An inferred transition of a card identity between two columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub identity: String,
    pub source: String,
    pub destination: String,
    /// Position of the card inside the destination column.
    pub index: usize,
}

/// One column -> marker rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub column: String,
    pub marker: String,
}

/// Ordered, case-insensitive column -> marker mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPolicy {
    #[serde(default)]
    pub entries: Vec<PolicyEntry>,
    pub incomplete: String,
    pub complete: String,
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            incomplete: DEFAULT_INCOMPLETE_MARKER.to_string(),
            complete: DEFAULT_COMPLETE_MARKER.to_string(),
        }
    }
}

impl MarkerPolicy {
    pub fn new(incomplete: &str, complete: &str) -> Self {
        Self {
            entries: Vec::new(),
            incomplete: incomplete.to_string(),
            complete: complete.to_string(),
        }
    }

    /// Add or replace the rule for a column.
    pub fn with(mut self, column: &str, marker: &str) -> Self {
        self.set(column, marker);
        self
    }

    pub fn set(&mut self, column: &str, marker: &str) {
        let key = column_key(column);
        match self.entries.iter_mut().find(|e| column_key(&e.column) == key) {
            Some(entry) => entry.marker = marker.to_string(),
            None => self.entries.push(PolicyEntry {
                column: column.to_string(),
                marker: marker.to_string(),
            }),
        }
    }

    /// Target marker for a column; unlisted columns get the incomplete marker.
    pub fn marker_for(&self, column: &str) -> &str {
        let key = column_key(column);
        self.entries
            .iter()
            .find(|e| column_key(&e.column) == key)
            .map(|e| e.marker.as_str())
            .unwrap_or(&self.incomplete)
    }

    /// Markers other than the incomplete/complete pair.
    pub fn is_custom(&self, marker: &str) -> bool {
        marker != self.incomplete && marker != self.complete
    }
}
