//! Locating search text in a file.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::text::{compute_line_starts, count_newlines};

/// Horizontal whitespace: everything `\s` matches except the newline.
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid whitespace regex"));

/// Inclusive 1-indexed line bounds of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMatch {
    pub start_line: usize,
    pub end_line: usize,
}

/// Find `search` in `code`, looking only at lines after `after_line`.
///
/// The exact text is tried first and its first occurrence wins. With
/// `allow_fallback`, horizontal whitespace is then stripped from both sides
/// and the normalized search must occur exactly once.
pub fn find_text_in_code(
    search: &str,
    code: &str,
    allow_fallback: bool,
    after_line: usize,
) -> EngineResult<LineMatch> {
    if search.trim().is_empty() {
        // Only an empty file can be targeted by an empty ORIGINAL
        return if code.trim().is_empty() {
            Ok(LineMatch {
                start_line: 1,
                end_line: 1,
            })
        } else {
            Err(EngineError::not_found(search))
        };
    }

    let line_starts = compute_line_starts(code);
    let offset = match after_line {
        0 => 0,
        n => line_starts.get(n).copied().unwrap_or(code.len()),
    };
    let haystack = &code[offset..];

    if let Some(idx) = haystack.find(search) {
        let start = offset + idx;
        let start_line = count_newlines(&code[..start]) + 1;
        let end_line = start_line + count_newlines(search.trim_end_matches('\n'));
        return Ok(LineMatch {
            start_line,
            end_line,
        });
    }

    if !allow_fallback {
        return Err(EngineError::not_found(search));
    }

    let needle = HORIZONTAL_WHITESPACE.replace_all(search, "");
    let needle = needle.trim_end_matches('\n');
    let (normalized, offsets) = normalize_with_offsets(haystack);

    let Some(idx) = normalized.find(needle) else {
        return Err(EngineError::not_found(search));
    };
    if normalized.rfind(needle) != Some(idx) {
        return Err(EngineError::not_unique(search));
    }

    let start = offset + offsets[idx];
    let last = offset + offsets[idx + needle.len() - 1];
    Ok(LineMatch {
        start_line: count_newlines(&code[..start]) + 1,
        end_line: count_newlines(&code[..last]) + 1,
    })
}

/// Strip horizontal whitespace, remembering the source byte of every kept byte.
fn normalize_with_offsets(text: &str) -> (String, Vec<usize>) {
    let mut normalized = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    let mut keep_from = 0;

    let gaps = HORIZONTAL_WHITESPACE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((text.len(), text.len())));
    for (gap_start, gap_end) in gaps {
        let kept = &text[keep_from..gap_start];
        normalized.push_str(kept);
        offsets.extend(keep_from..gap_start);
        keep_from = gap_end;
    }

    (normalized, offsets)
}

/// Byte range covering whole lines `start_line..=end_line`, without the final newline.
pub fn line_byte_range(
    code: &str,
    line_starts: &[usize],
    start_line: usize,
    end_line: usize,
) -> (usize, usize) {
    let start = line_starts
        .get(start_line.saturating_sub(1))
        .copied()
        .unwrap_or(code.len());
    let end = line_starts
        .get(end_line)
        .map(|next| next - 1)
        .unwrap_or(code.len());
    (start, end.max(start))
}
