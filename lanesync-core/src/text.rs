/// Line-level text helpers shared by the parser, the synchronizer and the
/// normalization analyzer.
///
/// Lines always keep their terminator (`\n` or `\r\n`) so that joining the
/// pieces reproduces the input byte for byte.

/// Split text into lines, each keeping its line terminator.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Strip a trailing `\n` / `\r\n` from a single line.
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Column title of a level-2 heading line (`## Title`), trimmed.
pub fn heading_title(line: &str) -> Option<&str> {
    strip_terminator(line).strip_prefix("## ").map(str::trim)
}

/// Whether the trimmed line opens a list item (`- ` or `* `).
pub fn is_list_item(line: &str) -> bool {
    let trimmed = strip_terminator(line).trim_start();
    trimmed.starts_with("- ") || trimmed.starts_with("* ")
}

/// Blank lines and lines starting with whitespace continue the card above.
pub fn is_continuation(line: &str) -> bool {
    let content = strip_terminator(line);
    content.trim().is_empty() || content.starts_with(char::is_whitespace)
}

/// Tag every line with the title of its enclosing column in one forward pass.
/// Lines before the first heading get `None`; a heading line carries its own title.
pub fn tag_columns<'a>(lines: &[&'a str]) -> Vec<Option<&'a str>> {
    let mut current = None;
    lines
        .iter()
        .map(|line| {
            if let Some(title) = heading_title(line) {
                current = Some(title);
            }
            current
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_keeps_terminators() {
        let text = "## Todo\r\n- [ ] a\n\nlast";
        let lines = split_lines(text);
        assert_eq!(lines, vec!["## Todo\r\n", "- [ ] a\n", "\n", "last"]);
        assert_eq!(lines.concat(), text);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_heading_title() {
        assert_eq!(heading_title("## In Progress \n"), Some("In Progress"));
        assert_eq!(heading_title("### Nested"), None);
        assert_eq!(heading_title("##NoSpace"), None);
        assert_eq!(heading_title(" ## Indented"), None);
    }

    #[test]
    fn test_list_items_and_continuations() {
        assert!(is_list_item("- [ ] task\n"));
        assert!(is_list_item("  * nested"));
        assert!(!is_list_item("-no space"));
        assert!(is_continuation("\n"));
        assert!(is_continuation("   \r\n"));
        assert!(is_continuation("\tindented"));
        assert!(!is_continuation("plain"));
    }

    #[test]
    fn test_tag_columns_forward_pass() {
        let lines = split_lines("intro\n## A\n- x\n## B\n- y\n");
        let tags = tag_columns(&lines);
        assert_eq!(tags, vec![None, Some("A"), Some("A"), Some("B"), Some("B")]);
    }
}
