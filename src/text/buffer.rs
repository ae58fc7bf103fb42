//! The text buffer collaborator.
//!
//! The engine never owns an editor widget; it talks to one through
//! [`TextBuffer`]. [`MemoryBuffer`] is a plain `String`-backed implementation
//! used by the CLI and the tests.

use super::position::{TextRange, compute_line_starts, position_to_offset};

/// One mutation of a buffer: `text` replaced lines `start_line..=end_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Callback invoked synchronously for every mutation of a buffer.
pub type ChangeListener = Box<dyn FnMut(&BufferChange) + Send>;

/// Line-addressed text storage edited by the engine and the user.
pub trait TextBuffer: Send {
    /// Entire contents.
    fn text(&self) -> String;

    /// Contents of `range`, with clamping.
    fn text_in(&self, range: TextRange) -> String;

    /// Number of lines (an empty buffer has one line).
    fn line_count(&self) -> usize;

    /// Replace `range` with `text` and notify the change listener.
    fn apply_edit(&mut self, range: TextRange, text: &str);

    /// Install the listener notified after every `apply_edit`.
    fn set_change_listener(&mut self, listener: ChangeListener);
}

/// `String`-backed buffer.
#[derive(Default)]
pub struct MemoryBuffer {
    text: String,
    listener: Option<ChangeListener>,
}

impl MemoryBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            listener: None,
        }
    }

    fn offsets(&self, range: TextRange) -> (usize, usize) {
        let line_starts = compute_line_starts(&self.text);
        let start = position_to_offset(&self.text, &line_starts, range.start);
        let end = position_to_offset(&self.text, &line_starts, range.end);
        (start, end.max(start))
    }

    fn clamp_line(&self, line: usize) -> usize {
        line.clamp(1, self.line_count())
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("text", &self.text)
            .field("listener", &self.listener.as_ref().map(|_| "ChangeListener"))
            .finish()
    }
}

impl TextBuffer for MemoryBuffer {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn text_in(&self, range: TextRange) -> String {
        let (start, end) = self.offsets(range);
        self.text[start..end].to_string()
    }

    fn line_count(&self) -> usize {
        compute_line_starts(&self.text).len()
    }

    fn apply_edit(&mut self, range: TextRange, text: &str) {
        // Report the lines that were actually touched after clamping
        let change = BufferChange {
            start_line: self.clamp_line(range.start.line),
            end_line: self.clamp_line(range.end.line.max(range.start.line)),
            text: text.to_string(),
        };
        let (start, end) = self.offsets(range);
        self.text.replace_range(start..end, text);

        if let Some(listener) = self.listener.as_mut() {
            listener(&change);
        }
    }

    fn set_change_listener(&mut self, listener: ChangeListener) {
        self.listener = Some(listener);
    }
}
