//! Async drivers connecting an [`LlmTransport`] to the engine.
//!
//! The engine itself is synchronous. A driver awaits stream events and takes
//! the engine lock only to apply each one, so user edits and other documents
//! interleave between deltas.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use url::Url;

use crate::engine::{Engine, PatchProgress};
use crate::error::{EngineError, EngineResult, LockResultExt};
use crate::llm::{ChatMessage, LlmRequest, LlmStream, LlmTransport, StreamEvent};
use crate::prompts::{corrective_message, rewrite_request, search_replace_request};
use crate::region::RegionId;

const LOG_TARGET: &str = "zonediff::driver";

/// Engine shared between drivers and the host.
pub type SharedEngine = Arc<Mutex<Engine>>;

pub fn shared(engine: Engine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Options for building prompts.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    /// Markdown info string of code fences.
    pub language: String,
    /// Send the lines around a rewritten selection as context.
    pub include_context: bool,
}

enum PatchAttempt {
    Completed,
    Retry { reason: EngineError, output: String },
    Failed { message: String },
}

/// Stream a rewrite of `[start_line, end_line]`. Returns the edit zone.
pub async fn run_rewrite(
    engine: &SharedEngine,
    transport: &dyn LlmTransport,
    uri: &Url,
    start_line: usize,
    end_line: usize,
    instructions: &str,
    options: &PromptOptions,
) -> EngineResult<RegionId> {
    let (zone, stream) = {
        let mut engine = engine.lock().recover_poison("run_rewrite")?;
        let (start_line, end_line) = engine.clamp_lines(uri, start_line, end_line)?;
        let request = build_rewrite_request(&engine, uri, start_line, end_line, instructions, options)?;
        let stream = transport.send_message(request);
        match engine.start_rewrite(uri, start_line, end_line, stream.handle().clone()) {
            Ok(zone) => (zone, stream),
            Err(err) => {
                stream.cancel();
                return Err(err);
            }
        }
    };
    drive_rewrite(engine, transport.provider(), zone, stream).await?;
    Ok(zone)
}

/// Stream a rewrite of the lines under a prompt zone, using its text as instructions.
pub async fn run_quick_edit(
    engine: &SharedEngine,
    transport: &dyn LlmTransport,
    prompt_zone: RegionId,
    options: &PromptOptions,
) -> EngineResult<RegionId> {
    let (zone, stream) = {
        let mut engine = engine.lock().recover_poison("run_quick_edit")?;
        let region = engine
            .region(prompt_zone)
            .ok_or(EngineError::RegionNotFound(prompt_zone))?;
        let prompt = region.as_prompt_zone().ok_or_else(|| {
            EngineError::invalid_state(format!("{} is not a prompt zone", prompt_zone))
        })?;
        let (uri, start_line, end_line, instructions) = (
            region.document.clone(),
            region.start_line,
            region.end_line,
            prompt.user_text.clone(),
        );
        let request =
            build_rewrite_request(&engine, &uri, start_line, end_line, &instructions, options)?;
        let stream = transport.send_message(request);
        match engine.start_quick_edit(prompt_zone, stream.handle().clone()) {
            Ok(zone) => (zone, stream),
            Err(err) => {
                stream.cancel();
                return Err(err);
            }
        }
    };
    drive_rewrite(engine, transport.provider(), zone, stream).await?;
    Ok(zone)
}

fn build_rewrite_request(
    engine: &Engine,
    uri: &Url,
    start_line: usize,
    end_line: usize,
    instructions: &str,
    options: &PromptOptions,
) -> EngineResult<LlmRequest> {
    let selection = engine.lines_text(uri, start_line, end_line)?;
    let (prefix, suffix) = if options.include_context {
        let line_count = engine.line_count(uri)?;
        let prefix = if start_line > 1 {
            Some(engine.lines_text(uri, 1, start_line - 1)?)
        } else {
            None
        };
        let suffix = if end_line < line_count {
            Some(engine.lines_text(uri, end_line + 1, line_count)?)
        } else {
            None
        };
        (prefix, suffix)
    } else {
        (None, None)
    };
    Ok(rewrite_request(
        &selection,
        instructions,
        &options.language,
        prefix.as_deref(),
        suffix.as_deref(),
    ))
}

/// Feed `stream` into a rewrite zone until it terminates.
///
/// Aborts surface as [`EngineError::StreamAborted`]; transport failures abort
/// the zone and surface as [`EngineError::Transport`].
pub async fn drive_rewrite(
    engine: &SharedEngine,
    provider: &str,
    zone: RegionId,
    mut stream: LlmStream,
) -> EngineResult<()> {
    while let Some(event) = stream.next().await {
        let mut engine = engine.lock().recover_poison("drive_rewrite")?;
        match event {
            StreamEvent::Delta { full_text } => match engine.stream_delta(zone, &full_text) {
                Ok(()) => {}
                Err(EngineError::StreamNotActive(_)) => {
                    // Aborted from the host side (undo, close, abort)
                    stream.cancel();
                    return Err(EngineError::StreamAborted);
                }
                Err(err) => {
                    stream.cancel();
                    abort_quietly(&mut engine, zone);
                    return Err(err);
                }
            },
            StreamEvent::Completed { full_text } => {
                return match engine.finish_stream(zone, &full_text) {
                    Err(EngineError::StreamNotActive(_)) => Err(EngineError::StreamAborted),
                    other => other,
                };
            }
            StreamEvent::Aborted => {
                abort_quietly(&mut engine, zone);
                return Err(EngineError::StreamAborted);
            }
            StreamEvent::Failed(message) => {
                warn!(target: LOG_TARGET, "{} stream failed: {}", provider, message);
                abort_quietly(&mut engine, zone);
                return Err(EngineError::Transport {
                    provider: provider.to_string(),
                    attempts: 1,
                    message,
                });
            }
        }
    }
    Err(EngineError::StreamAborted)
}

/// Ask for search/replace blocks and stream them into the document.
///
/// Blocks that cannot be located are retried with a corrective message, and
/// failed transport requests are resent as they were. Both count against
/// `patch.max_retries` attempts. Returns the whole-document edit zone.
pub async fn run_patch(
    engine: &SharedEngine,
    transport: &dyn LlmTransport,
    uri: &Url,
    instructions: &str,
    options: &PromptOptions,
) -> EngineResult<RegionId> {
    let (zone, mut request, mut stream, max_attempts) = {
        let mut engine = engine.lock().recover_poison("run_patch")?;
        let max_attempts = engine.settings().patch.max_retries.max(1);
        let request =
            search_replace_request(&engine.document_text(uri)?, instructions, &options.language);
        let stream = transport.send_message(request.clone());
        match engine.start_patch_stream(uri, stream.handle().clone()) {
            Ok(zone) => (zone, request, stream, max_attempts),
            Err(err) => {
                stream.cancel();
                return Err(err);
            }
        }
    };

    let mut attempts = 1;
    loop {
        match drive_patch_attempt(engine, transport.provider(), zone, &mut stream).await? {
            PatchAttempt::Completed => {
                info!(
                    target: LOG_TARGET,
                    "Patch on {} applied after {} attempt(s)", uri, attempts
                );
                return Ok(zone);
            }
            PatchAttempt::Retry { reason, output } => {
                if attempts >= max_attempts {
                    abandon_patch(engine, zone, uri, attempts)?;
                    return Err(EngineError::RetriesExhausted {
                        attempts,
                        last_error: reason.to_string(),
                    });
                }
                request.push(ChatMessage::assistant(output));
                request.push(corrective_message(&reason));
            }
            PatchAttempt::Failed { message } => {
                if attempts >= max_attempts {
                    abandon_patch(engine, zone, uri, attempts)?;
                    return Err(EngineError::Transport {
                        provider: transport.provider().to_string(),
                        attempts,
                        message,
                    });
                }
            }
        }

        attempts += 1;
        debug!(target: LOG_TARGET, "Retrying patch on {} (attempt {})", uri, attempts);
        stream = transport.send_message(request.clone());

        let mut engine = engine.lock().recover_poison("run_patch")?;
        if let Err(err) = engine.restart_patch_stream(zone, stream.handle().clone()) {
            stream.cancel();
            return Err(match err {
                EngineError::StreamNotActive(_) => EngineError::StreamAborted,
                other => other,
            });
        }
    }
}

fn abandon_patch(
    engine: &SharedEngine,
    zone: RegionId,
    uri: &Url,
    attempts: u32,
) -> EngineResult<()> {
    warn!(
        target: LOG_TARGET,
        "Giving up on patch for {} after {} attempt(s)", uri, attempts
    );
    let mut engine = engine.lock().recover_poison("run_patch")?;
    abort_quietly(&mut engine, zone);
    Ok(())
}

async fn drive_patch_attempt(
    engine: &SharedEngine,
    provider: &str,
    zone: RegionId,
    stream: &mut LlmStream,
) -> EngineResult<PatchAttempt> {
    while let Some(event) = stream.next().await {
        let mut engine = engine.lock().recover_poison("drive_patch_attempt")?;
        let (progress, output) = match event {
            StreamEvent::Delta { full_text } => (engine.patch_delta(zone, &full_text), full_text),
            StreamEvent::Completed { full_text } => {
                (engine.finish_patch_stream(zone, &full_text), full_text)
            }
            StreamEvent::Aborted => {
                abort_quietly(&mut engine, zone);
                return Err(EngineError::StreamAborted);
            }
            StreamEvent::Failed(message) => {
                warn!(target: LOG_TARGET, "{} stream failed: {}", provider, message);
                return Ok(PatchAttempt::Failed { message });
            }
        };

        match progress {
            Ok(PatchProgress::Streaming) => {}
            Ok(PatchProgress::Completed) => return Ok(PatchAttempt::Completed),
            Ok(PatchProgress::Retry { reason }) => {
                stream.cancel();
                return Ok(PatchAttempt::Retry { reason, output });
            }
            Err(EngineError::StreamNotActive(_)) => {
                stream.cancel();
                return Err(EngineError::StreamAborted);
            }
            Err(err) => {
                stream.cancel();
                abort_quietly(&mut engine, zone);
                return Err(err);
            }
        }
    }
    Err(EngineError::StreamAborted)
}

fn abort_quietly(engine: &mut Engine, zone: RegionId) {
    match engine.abort_stream(zone) {
        Ok(()) | Err(EngineError::StreamNotActive(_)) => {}
        Err(err) => warn!(target: LOG_TARGET, "Failed to abort {}: {}", zone, err),
    }
}
