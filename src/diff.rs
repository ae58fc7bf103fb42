//! Line-level diff oracle.
//!
//! Wraps `similar`'s line diff and groups consecutive changed lines into
//! Insertion/Deletion/Edit hunks with 1-indexed, inclusive line ranges relative
//! to each input. Callers offset the ranges into document coordinates.

use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag, TextDiff};

/// Kind of a line hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Lines only present in the modified text (`original_end_line = original_start_line - 1`).
    Insertion,
    /// Lines only present in the original text (`end_line = start_line - 1`).
    Deletion,
    /// Lines replaced by other lines.
    Edit,
}

/// One hunk returned by [`diff_lines`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    pub kind: DiffKind,
    pub start_line: usize,
    pub end_line: usize,
    pub original_start_line: usize,
    pub original_end_line: usize,
    /// Text of `start_line..=end_line` in the modified input.
    pub code: String,
    /// Text of `original_start_line..=original_end_line` in the original input.
    pub original_code: String,
}

/// Diff two texts line by line.
///
/// Both inputs get a trailing newline before diffing so that `"E"` vs `"E\n"`
/// is reported as an insertion instead of an edit of the last line. The result
/// is ordered by line and hunks never overlap. Never fails.
pub fn diff_lines(original: &str, modified: &str) -> Vec<LineDiff> {
    let old = format!("{original}\n");
    let new = format!("{modified}\n");
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(&old, &new);

    let old_lines: Vec<&str> = original.split('\n').collect();
    let new_lines: Vec<&str> = modified.split('\n').collect();

    let mut hunks = Vec::new();
    // (new_start, old_start, new_end, old_end), all 1-indexed inclusive ends
    let mut streak: Option<(usize, usize, usize, usize)> = None;

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            if let Some(s) = streak.take() {
                hunks.push(build_hunk(s, &old_lines, &new_lines));
            }
            continue;
        }
        let entry = streak.get_or_insert((new_range.start + 1, old_range.start + 1, 0, 0));
        entry.2 = new_range.end;
        entry.3 = old_range.end;
    }
    if let Some(s) = streak.take() {
        hunks.push(build_hunk(s, &old_lines, &new_lines));
    }

    hunks
}

fn build_hunk(
    (start_line, original_start_line, end_line, original_end_line): (usize, usize, usize, usize),
    old_lines: &[&str],
    new_lines: &[&str],
) -> LineDiff {
    let kind = if end_line + 1 == start_line {
        DiffKind::Deletion
    } else if original_end_line + 1 == original_start_line {
        DiffKind::Insertion
    } else {
        DiffKind::Edit
    };

    LineDiff {
        kind,
        start_line,
        end_line,
        original_start_line,
        original_end_line,
        code: join_lines(new_lines, start_line, end_line),
        original_code: join_lines(old_lines, original_start_line, original_end_line),
    }
}

fn join_lines(lines: &[&str], start_line: usize, end_line: usize) -> String {
    if end_line < start_line {
        return String::new();
    }
    let end = end_line.min(lines.len());
    let start = (start_line - 1).min(end);
    lines[start..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_diffs() {
        assert!(diff_lines("a\nb", "a\nb").is_empty());
        assert!(diff_lines("", "").is_empty());
    }

    #[test]
    fn test_insertion_in_middle() {
        let diffs = diff_lines("a\nb\nc", "a\nb\nb2\nc");
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert_eq!(d.kind, DiffKind::Insertion);
        assert_eq!((d.start_line, d.end_line), (3, 3));
        assert_eq!((d.original_start_line, d.original_end_line), (3, 2));
        assert_eq!(d.code, "b2");
        assert_eq!(d.original_code, "");
    }

    #[test]
    fn test_deletion() {
        let diffs = diff_lines("a\nb\nc", "a\nc");
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert_eq!(d.kind, DiffKind::Deletion);
        assert_eq!((d.start_line, d.end_line), (2, 1));
        assert_eq!((d.original_start_line, d.original_end_line), (2, 2));
        assert_eq!(d.original_code, "b");
    }

    #[test]
    fn test_edit() {
        let diffs = diff_lines("a\nb\nc", "a\nB\nc");
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert_eq!(d.kind, DiffKind::Edit);
        assert_eq!((d.start_line, d.end_line), (2, 2));
        assert_eq!((d.original_start_line, d.original_end_line), (2, 2));
        assert_eq!(d.code, "B");
        assert_eq!(d.original_code, "b");
    }

    #[test]
    fn test_trailing_newline_is_an_insertion() {
        let diffs = diff_lines("E", "E\n");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Insertion);
    }

    #[test]
    fn test_empty_original_is_an_edit_of_line_one() {
        let diffs = diff_lines("", "x\ny");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Edit);
        assert_eq!((diffs[0].start_line, diffs[0].end_line), (1, 2));
        assert_eq!(diffs[0].code, "x\ny");
    }

    #[test]
    fn test_hunks_are_ordered_and_disjoint() {
        let original = "1\n2\n3\n4\n5\n6\n7";
        let modified = "1\nX\n3\n4\n6\n7\n8";
        let diffs = diff_lines(original, modified);
        assert!(diffs.len() >= 2);
        for pair in diffs.windows(2) {
            assert!(pair[0].start_line < pair[1].start_line);
            assert!(pair[0].original_end_line < pair[1].original_start_line);
        }
    }
}
