//! Search/replace block parsing.
//!
//! The parser runs on every streamed delta, so it must accept text that ends
//! anywhere: in the middle of a block, or in the middle of a marker. Partially
//! written markers are trimmed from the tail so they never reach the buffer.

use serde::{Deserialize, Serialize};

pub const ORIGINAL_MARKER: &str = "<<<<<<< ORIGINAL";
pub const DIVIDER_MARKER: &str = "=======";
pub const UPDATED_MARKER: &str = ">>>>>>> UPDATED";

/// How far the LLM has written a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockState {
    /// Still inside the ORIGINAL section.
    WritingOriginal,
    /// ORIGINAL is complete, the replacement is still streaming.
    WritingFinal,
    /// Both sections are closed.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReplaceBlock {
    pub search: String,
    pub replace: String,
    pub state: BlockState,
}

impl SearchReplaceBlock {
    pub fn is_done(&self) -> bool {
        self.state == BlockState::Done
    }

    /// Whether the ORIGINAL section is complete.
    pub fn has_full_search(&self) -> bool {
        self.state >= BlockState::WritingFinal
    }
}

/// Parse every block in `text`, including a trailing incomplete one.
pub fn parse_blocks(text: &str) -> Vec<SearchReplaceBlock> {
    let original_open = format!("{ORIGINAL_MARKER}\n");
    let divider = format!("\n{DIVIDER_MARKER}\n");
    let updated_close = format!("\n{UPDATED_MARKER}");

    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find(&original_open) {
        let search_start = pos + found + original_open.len();

        // Start one byte early so an empty ORIGINAL section still matches
        let Some(div_idx) = find_from(text, &divider, search_start - 1) else {
            blocks.push(SearchReplaceBlock {
                search: trim_partial_marker(&text[search_start..], &divider).to_string(),
                replace: String::new(),
                state: BlockState::WritingOriginal,
            });
            break;
        };
        let search = section(text, search_start, div_idx);
        let replace_start = div_idx + divider.len();

        let close = find_from(text, &updated_close, replace_start - 1)
            .map(|idx| (idx, updated_close.len()))
            .or_else(|| {
                find_from(text, UPDATED_MARKER, replace_start)
                    .map(|idx| (idx, UPDATED_MARKER.len()))
            });

        match close {
            Some((close_idx, marker_len)) => {
                blocks.push(SearchReplaceBlock {
                    search,
                    replace: section(text, replace_start, close_idx),
                    state: BlockState::Done,
                });
                pos = close_idx + marker_len;
            }
            None => {
                blocks.push(SearchReplaceBlock {
                    search,
                    replace: trim_partial_marker(&text[replace_start..], &updated_close)
                        .to_string(),
                    state: BlockState::WritingFinal,
                });
                break;
            }
        }
    }

    blocks
}

fn find_from(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|idx| from + idx)
}

fn section(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        String::new()
    } else {
        text[start..end].to_string()
    }
}

/// Drop the longest proper prefix of `marker` that `text` ends with.
fn trim_partial_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    for len in (1..marker.len()).rev() {
        if text.ends_with(&marker[..len]) {
            return &text[..text.len() - len];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(search: &str, replace: &str) -> String {
        format!("{ORIGINAL_MARKER}\n{search}\n{DIVIDER_MARKER}\n{replace}\n{UPDATED_MARKER}")
    }

    #[test]
    fn test_parse_complete_blocks() {
        let text = format!(
            "Here is the change:\n{}\nand another\n{}\n",
            block("fn a() {}", "fn a() { 1 }"),
            block("let x = 1;\nlet y = 2;", "let x = 3;")
        );
        let blocks = parse_blocks(&text);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(SearchReplaceBlock::is_done));
        assert_eq!(blocks[0].search, "fn a() {}");
        assert_eq!(blocks[0].replace, "fn a() { 1 }");
        assert_eq!(blocks[1].search, "let x = 1;\nlet y = 2;");
        assert_eq!(blocks[1].replace, "let x = 3;");
    }

    #[test]
    fn test_parse_empty_sections() {
        let text = format!("{ORIGINAL_MARKER}\n{DIVIDER_MARKER}\n{UPDATED_MARKER}");
        let blocks = parse_blocks(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].search, "");
        assert_eq!(blocks[0].replace, "");
        assert_eq!(blocks[0].state, BlockState::Done);
    }

    #[test]
    fn test_parse_block_still_writing_original() {
        let text = format!("{ORIGINAL_MARKER}\nfn main() {{\n    let");
        let blocks = parse_blocks(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].state, BlockState::WritingOriginal);
        assert_eq!(blocks[0].search, "fn main() {\n    let");
    }

    #[test]
    fn test_partial_divider_is_trimmed() {
        let text = format!("{ORIGINAL_MARKER}\nold line\n====");
        let blocks = parse_blocks(&text);
        assert_eq!(blocks[0].state, BlockState::WritingOriginal);
        assert_eq!(blocks[0].search, "old line");
    }

    #[test]
    fn test_block_writing_final_hides_partial_close_marker() {
        let text = format!("{ORIGINAL_MARKER}\nold\n{DIVIDER_MARKER}\nnew line\n>>>>");
        let blocks = parse_blocks(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].state, BlockState::WritingFinal);
        assert!(blocks[0].has_full_search());
        assert_eq!(blocks[0].search, "old");
        assert_eq!(blocks[0].replace, "new line");
    }

    #[test]
    fn test_trailing_newline_in_replacement_is_held_back() {
        let text = format!("{ORIGINAL_MARKER}\nold\n{DIVIDER_MARKER}\nnew\n");
        let blocks = parse_blocks(&text);
        assert_eq!(blocks[0].replace, "new");
    }

    #[test]
    fn test_partial_open_marker_yields_nothing() {
        assert!(parse_blocks("some prose\n<<<<<<< ORIG").is_empty());
        assert!(parse_blocks("no blocks here").is_empty());
    }
}
