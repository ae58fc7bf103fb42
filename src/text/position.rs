use serde::{Deserialize, Serialize};

/// Column value meaning "end of the line", whatever its length.
pub const END_OF_LINE: usize = usize::MAX;

/// A 1-indexed line/column position. Columns count Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A half-open range between two positions (`end` is exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Empty range at `position`, used for insertions.
    pub fn at(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// Whole lines `start_line..=end_line`, excluding the trailing newline.
    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self {
            start: Position::new(start_line, 1),
            end: Position::new(end_line, END_OF_LINE),
        }
    }
}

/// Number of `\n` characters in `text`.
pub fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Number of lines `text` occupies once written into a buffer.
pub fn line_height(text: &str) -> usize {
    count_newlines(text) + 1
}

/// Byte offsets of the start of every line. Always has at least one entry.
pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }
    line_starts
}

/// Convert a position to a byte offset, clamping out-of-range values.
///
/// Lines past the end clamp to the end of the text; columns past the end of a
/// line clamp to the end of that line (before its newline).
pub fn position_to_offset(text: &str, line_starts: &[usize], position: Position) -> usize {
    let line = position.line.max(1);
    if line > line_starts.len() {
        return text.len();
    }
    let line_start = line_starts[line - 1];
    let line_end = line_starts
        .get(line)
        .map(|next| next - 1)
        .unwrap_or(text.len());
    let line_text = &text[line_start..line_end];

    let column = position.column.max(1) - 1;
    let byte_in_line = line_text
        .char_indices()
        .nth(column)
        .map(|(idx, _)| idx)
        .unwrap_or(line_text.len());
    line_start + byte_in_line
}

/// Lines `start_line..=end_line` (1-indexed) of `text` joined with `\n`.
///
/// Out-of-range lines are skipped; an empty selection yields an empty string.
pub fn slice_lines(text: &str, start_line: usize, end_line: usize) -> String {
    if end_line < start_line {
        return String::new();
    }
    text.split('\n')
        .skip(start_line.saturating_sub(1))
        .take(end_line + 1 - start_line.max(1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_height_counts_trailing_segment() {
        assert_eq!(line_height(""), 1);
        assert_eq!(line_height("abc"), 1);
        assert_eq!(line_height("a\nb"), 2);
        assert_eq!(line_height("a\n"), 2);
    }

    #[test]
    fn test_compute_line_starts() {
        assert_eq!(compute_line_starts(""), vec![0]);
        assert_eq!(compute_line_starts("ab\ncd\n"), vec![0, 3, 6]);
    }

    #[test]
    fn test_position_to_offset_clamps_column_to_line_end() {
        let text = "abc\nde";
        let starts = compute_line_starts(text);
        assert_eq!(position_to_offset(text, &starts, Position::new(1, 1)), 0);
        assert_eq!(position_to_offset(text, &starts, Position::new(1, 3)), 2);
        assert_eq!(position_to_offset(text, &starts, Position::new(1, 99)), 3);
        assert_eq!(
            position_to_offset(text, &starts, Position::new(2, END_OF_LINE)),
            6
        );
    }

    #[test]
    fn test_position_to_offset_clamps_line_to_text_end() {
        let text = "abc\nde";
        let starts = compute_line_starts(text);
        assert_eq!(position_to_offset(text, &starts, Position::new(9, 1)), 6);
    }

    #[test]
    fn test_position_to_offset_counts_chars_not_bytes() {
        let text = "あいx";
        let starts = compute_line_starts(text);
        // "x" is the third character but starts at byte 6
        assert_eq!(position_to_offset(text, &starts, Position::new(1, 3)), 6);
    }

    #[test]
    fn test_slice_lines() {
        let text = "a\nb\nc\nd";
        assert_eq!(slice_lines(text, 2, 3), "b\nc");
        assert_eq!(slice_lines(text, 1, 1), "a");
        assert_eq!(slice_lines(text, 3, 2), "");
        assert_eq!(slice_lines(text, 4, 9), "d");
    }
}
