//! Structured-patch application.
//!
//! A patch is a list of search/replace blocks (see [`blocks`]). Each block's
//! ORIGINAL text is located in the file ([`locate`]), widened to whole lines,
//! and replaced. This module applies a complete patch in one step; the
//! streaming variant lives in `engine::patch_stream`.

pub mod blocks;
pub mod locate;

use log::debug;

pub use blocks::{
    BlockState, DIVIDER_MARKER, ORIGINAL_MARKER, SearchReplaceBlock, UPDATED_MARKER, parse_blocks,
};
pub use locate::{LineMatch, find_text_in_code, line_byte_range};

use crate::error::{EngineError, EngineResult};
use crate::text::compute_line_starts;

const LOG_TARGET: &str = "zonediff::patch";

/// Apply every block to `code` and return the new text.
///
/// Blocks are located independently in the unmodified text, except that a
/// search repeating an earlier block's is looked up below it. Overlapping
/// blocks fail with `HasOverlap`; nothing is applied unless every block is
/// located.
pub fn apply_blocks(
    code: &str,
    blocks: &[SearchReplaceBlock],
    allow_fallback: bool,
) -> EngineResult<String> {
    let line_starts = compute_line_starts(code);

    let mut replacements = Vec::with_capacity(blocks.len());
    let mut claimed: Vec<(&str, usize)> = Vec::new();
    for block in blocks {
        // Repeated searches resolve to successive occurrences
        let after_line = claimed
            .iter()
            .rev()
            .find(|(search, _)| *search == block.search)
            .map_or(0, |(_, end_line)| *end_line);
        let found = find_text_in_code(&block.search, code, allow_fallback, after_line)?;
        claimed.push((&block.search, found.end_line));
        let (start, end) = line_byte_range(code, &line_starts, found.start_line, found.end_line);
        debug!(
            target: LOG_TARGET,
            "Located block at lines {}-{}", found.start_line, found.end_line
        );
        replacements.push((start, end, block));
    }

    replacements.sort_by_key(|(start, end, _)| (*start, *end));
    for pair in replacements.windows(2) {
        let (_, prev_end, _) = pair[0];
        let (start, _, block) = pair[1];
        if start <= prev_end {
            return Err(EngineError::has_overlap(&block.search));
        }
    }

    let mut result = code.to_string();
    for (start, end, block) in replacements.iter().rev() {
        result.replace_range(*start..*end, &block.replace);
    }
    Ok(result)
}

/// Parse `patch_text` and apply its complete blocks to `code`.
pub fn apply_patch(code: &str, patch_text: &str, allow_fallback: bool) -> EngineResult<String> {
    let blocks: Vec<SearchReplaceBlock> = parse_blocks(patch_text)
        .into_iter()
        .filter(SearchReplaceBlock::is_done)
        .collect();
    if blocks.is_empty() {
        return Err(EngineError::NoBlocksFound);
    }
    apply_blocks(code, &blocks, allow_fallback)
}
