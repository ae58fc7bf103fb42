//! Region realignment after document edits.
//!
//! Every mutation of a document replaces an inclusive line range
//! `[start_line, end_line]` with some text. Each tracked region is classified
//! against that range exactly once (the relationships partition all cases) and
//! its bounds are shifted so it keeps denoting the same logical lines.

use log::warn;

use crate::text::{BufferChange, line_height};

const LOG_TARGET: &str = "zonediff::realign";

/// A mutation expressed in lines: `[start_line, end_line]` became `new_height` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEdit {
    pub start_line: usize,
    pub end_line: usize,
    pub new_height: usize,
}

impl LineEdit {
    pub fn new(start_line: usize, end_line: usize, inserted_text: &str) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
            new_height: line_height(inserted_text),
        }
    }

    pub fn old_height(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Net number of lines added (negative when lines were removed).
    pub fn delta(&self) -> i64 {
        self.new_height as i64 - self.old_height() as i64
    }
}

impl From<&BufferChange> for LineEdit {
    fn from(change: &BufferChange) -> Self {
        LineEdit::new(change.start_line, change.end_line, &change.text)
    }
}

/// Inclusive line bounds of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineSpan {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }
}

/// How a region relates to an edit. Evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// The edit is strictly after the region.
    EditAfter,
    /// The edit is strictly before the region.
    EditBefore,
    /// The edit lies within the region.
    EditInside,
    /// The region lies strictly within the edit.
    RegionInside,
    /// The edit's tail covers the region's head.
    EditTailOverlapsHead,
    /// The edit's head covers the region's tail.
    EditHeadOverlapsTail,
}

/// Classify `span` against `edit`.
pub fn classify(span: LineSpan, edit: &LineEdit) -> Relationship {
    let (start, end) = (edit.start_line, edit.end_line);
    if span.end_line < start {
        Relationship::EditAfter
    } else if end < span.start_line {
        Relationship::EditBefore
    } else if start >= span.start_line && end <= span.end_line {
        Relationship::EditInside
    } else if span.start_line > start && span.end_line < end {
        Relationship::RegionInside
    } else if start < span.start_line && span.start_line <= end {
        Relationship::EditTailOverlapsHead
    } else {
        // Remaining case: start <= span.end_line < end
        debug_assert!(start <= span.end_line && span.end_line < end);
        Relationship::EditHeadOverlapsTail
    }
}

/// Apply a signed delta to a line number, never going below line 1.
fn apply_delta(line: usize, delta: i64) -> usize {
    (line as i64).saturating_add(delta).max(1) as usize
}

/// Compute the bounds of `span` after `edit`.
pub fn realign_span(span: LineSpan, edit: &LineEdit) -> LineSpan {
    let delta = edit.delta();
    let realigned = match classify(span, edit) {
        Relationship::EditAfter => span,
        Relationship::EditBefore => LineSpan::new(
            apply_delta(span.start_line, delta),
            apply_delta(span.end_line, delta),
        ),
        Relationship::EditInside => {
            LineSpan::new(span.start_line, apply_delta(span.end_line, delta))
        }
        Relationship::RegionInside => {
            LineSpan::new(edit.start_line, edit.start_line + edit.new_height)
        }
        Relationship::EditTailOverlapsHead => {
            let overlapping = edit.end_line - span.start_line + 1;
            let remaining = (span.end_line - span.start_line + 1) - overlapping;
            LineSpan::new(
                edit.start_line,
                edit.start_line + remaining + edit.new_height - 1,
            )
        }
        Relationship::EditHeadOverlapsTail => {
            let overlapping = span.end_line - edit.start_line + 1;
            LineSpan::new(
                span.start_line,
                apply_delta(
                    span.end_line,
                    edit.new_height as i64 - overlapping as i64,
                ),
            )
        }
    };

    if realigned.end_line < realigned.start_line {
        warn!(
            target: LOG_TARGET,
            "Realignment collapsed span {:?} under edit {:?}; clamping end to start",
            span, edit
        );
        return LineSpan::new(realigned.start_line, realigned.start_line);
    }
    realigned
}
