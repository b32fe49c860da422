//! Line arithmetic over source text.

/// Offset of the start of the line containing `offset`.
pub(crate) fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |idx| idx + 1)
}

/// Offset just past the line break ending the line containing `offset`, or
/// the end of the text.
pub(crate) fn line_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map_or(text.len(), |idx| offset + idx + 1)
}

/// Leading whitespace of the line containing `offset`.
pub(crate) fn indentation(text: &str, offset: usize) -> &str {
    let start = line_start(text, offset);
    let line = &text[start..];
    let len = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..len]
}

/// Whether only whitespace precedes `offset` on its line.
pub(crate) fn starts_line(text: &str, offset: usize) -> bool {
    text[line_start(text, offset)..offset]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}

/// Line break style used by `text`.
pub(crate) fn newline(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_helpers() {
        let text = "a = 1\n    b = 2\nc";
        assert_eq!(line_start(text, 10), 6);
        assert_eq!(line_end(text, 6), 16);
        assert_eq!(line_end(text, 16), 17);
        assert_eq!(indentation(text, 12), "    ");
        assert!(starts_line(text, 10));
        assert!(!starts_line(text, 14));
        assert_eq!(newline(text), "\n");
    }
}
