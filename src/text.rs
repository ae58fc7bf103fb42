//! Text manipulation utilities.
//!
//! This module provides utilities for working with line-addressed text:
//! - 1-indexed positions and ranges with clamping offset conversion
//! - The `TextBuffer` collaborator trait and an in-memory implementation

pub mod buffer;
pub mod position;

pub use buffer::{BufferChange, ChangeListener, MemoryBuffer, TextBuffer};
pub use position::{
    END_OF_LINE, Position, TextRange, compute_line_starts, count_newlines, line_height,
    slice_lines,
};
