/// Card identity and marker helpers.
///
/// A card's marker is the short bracketed token right after the list glyph
/// (`- [ ] task`, `* [/] task`). Its identity is the card text with the glyph
/// and that token removed, so it survives marker edits unchanged.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::text::strip_terminator;

static LIST_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*[-*][ \t]+").unwrap());

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\[\]\r\n]{1,3}\]").unwrap());

/// A list line split around its marker token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerLine<'a> {
    /// Indentation, list glyph and the spaces after it.
    pub prefix: &'a str,
    /// The bracketed token, brackets included.
    pub token: &'a str,
    /// Everything after the token, line terminator included.
    pub rest: &'a str,
}

/// Bracketed token at the very start of `body`, if it is followed by
/// whitespace or the end of the text. `[link](url)` is not a marker.
fn leading_token(body: &str) -> Option<&str> {
    let m = TOKEN_RE.find(body)?;
    match body[m.end()..].chars().next() {
        None => Some(m.as_str()),
        Some(c) if c.is_whitespace() => Some(m.as_str()),
        _ => None,
    }
}

/// Split a "list glyph + bracketed token" line into its parts.
pub fn parse_marker_line(line: &str) -> Option<MarkerLine<'_>> {
    let prefix = LIST_PREFIX_RE.find(line)?;
    let token = leading_token(&line[prefix.end()..])?;
    let token_end = prefix.end() + token.len();
    Some(MarkerLine {
        prefix: &line[..prefix.end()],
        token,
        rest: &line[token_end..],
    })
}

/// Extract the marker token of a card's first line.
pub fn extract_marker(line: &str) -> Option<String> {
    parse_marker_line(line).map(|parsed| parsed.token.to_string())
}

/// Replace only the marker token of a line. Borrowed when nothing changes
/// (no marker, or the marker already equals `token`).
pub fn replace_marker_token<'a>(line: &'a str, token: &str) -> Cow<'a, str> {
    match parse_marker_line(line) {
        Some(parsed) if parsed.token != token => {
            let mut out = String::with_capacity(line.len() + token.len());
            out.push_str(parsed.prefix);
            out.push_str(token);
            out.push_str(parsed.rest);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(line),
    }
}

/// Identity key of a card: raw text without list glyph and leading marker,
/// trimmed, with CRLF folded to LF.
pub fn identity_key(raw: &str) -> String {
    let body = match LIST_PREFIX_RE.find(raw) {
        Some(m) => &raw[m.end()..],
        None => raw.trim_start(),
    };
    let body = match leading_token(body) {
        Some(token) => &body[token.len()..],
        None => body,
    };
    body.trim().replace("\r\n", "\n")
}

/// Marker-insensitive form of a line, used to align two snapshots.
pub fn line_shape(line: &str) -> Cow<'_, str> {
    match parse_marker_line(line) {
        Some(parsed) => Cow::Owned(format!("{}[]{}", parsed.prefix, strip_terminator(parsed.rest))),
        None => Cow::Borrowed(strip_terminator(line)),
    }
}
