//! Prompt text sent to the LLM and post-processing of its output.

use crate::error::EngineError;
use crate::llm::{ChatMessage, LlmRequest};
use crate::patch::{DIVIDER_MARKER, ORIGINAL_MARKER, UPDATED_MARKER};

const FENCE: &str = "```";

/// Strip a surrounding Markdown code fence from (possibly partial) output.
///
/// Text that does not start with a fence is returned unchanged. While the
/// fence's language line is still streaming nothing is visible yet.
pub fn extract_code(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(after_fence) = trimmed.strip_prefix(FENCE) else {
        return text;
    };
    let Some(newline) = after_fence.find('\n') else {
        return "";
    };
    let body = &after_fence[newline + 1..];
    if body.starts_with(FENCE) {
        return "";
    }

    if let Some(end) = body.find("\n```") {
        return &body[..end];
    }
    // Closing fence partially streamed
    for partial in ["\n``", "\n`"] {
        if let Some(stripped) = body.strip_suffix(partial) {
            return stripped;
        }
    }
    body
}

fn fenced(code: &str, language: &str) -> String {
    format!("{FENCE}{language}\n{code}\n{FENCE}")
}

/// Request asking the model to rewrite `selection` following `instructions`.
pub fn rewrite_request(
    selection: &str,
    instructions: &str,
    language: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> LlmRequest {
    let system = "You are a coding assistant that rewrites a selection of code. \
        Reply with the complete new selection in a single code block and nothing else. \
        Preserve indentation and keep lines you do not need to change exactly as they are.";

    let mut user = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        user.push_str("Code before the selection:\n");
        user.push_str(&fenced(prefix, language));
        user.push_str("\n\n");
    }
    user.push_str("Selection:\n");
    user.push_str(&fenced(selection, language));
    user.push_str("\n\n");
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        user.push_str("Code after the selection:\n");
        user.push_str(&fenced(suffix, language));
        user.push_str("\n\n");
    }
    user.push_str("Instructions:\n");
    user.push_str(instructions.trim());

    LlmRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

/// Request asking the model to describe `instructions` as search/replace blocks.
pub fn search_replace_request(file_text: &str, instructions: &str, language: &str) -> LlmRequest {
    let system = format!(
        "You edit files by replying with search/replace blocks in exactly this format:\n\
         {ORIGINAL_MARKER}\n\
         lines copied verbatim from the file\n\
         {DIVIDER_MARKER}\n\
         the lines that replace them\n\
         {UPDATED_MARKER}\n\
         Each ORIGINAL section must match the file exactly and be unique in it. \
         Blocks must appear in file order and must not overlap. \
         Output only the blocks."
    );
    let user = format!(
        "File:\n{}\n\nInstructions:\n{}",
        fenced(file_text, language),
        instructions.trim()
    );
    LlmRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

/// Follow-up message explaining why the previous answer could not be applied.
pub fn corrective_message(error: &EngineError) -> ChatMessage {
    let hint = match error {
        EngineError::NoBlocksFound => format!(
            "Your answer did not contain any complete {ORIGINAL_MARKER} ... {UPDATED_MARKER} block."
        ),
        EngineError::NotFound { .. } | EngineError::NotUnique { .. } | EngineError::HasOverlap { .. } => {
            error.to_string()
        }
        other => format!("The previous answer could not be used: {}", other),
    };
    ChatMessage::user(format!(
        "{hint}\n\nPlease reply again with the full set of search/replace blocks."
    ))
}
