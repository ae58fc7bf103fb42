//! Streaming rewrites.
//!
//! An LLM regenerates the text of a zone and reports its cumulative output.
//! The writer keeps the buffer laid out as `[generated so far][original lines
//! not yet regenerated]`: each delta is typed at a cursor, then the original
//! remainder below the cursor is trimmed or restored so it starts at the first
//! original line the generation has not reached.

use log::{debug, info};
use url::Url;

use super::{EditCheckpoint, Engine, EngineEvent};
use crate::diff::diff_lines;
use crate::error::{EngineError, EngineResult};
use crate::prompts::extract_code;
use crate::region::{
    EditZone, LineEdit, Region, RegionId, RegionKind, RequestHandle, StreamState,
};
use crate::text::{Position, TextRange, count_newlines, line_height, slice_lines};

const STREAM_TARGET: &str = "zonediff::stream";

/// Where the next generated text goes, and how much original text it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    pub line: usize,
    pub column: usize,
    pub added_leading_newline: bool,
    /// First original line still shown below the cursor.
    pub original_cursor_line: usize,
}

impl StreamCursor {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            column: 1,
            added_leading_newline: false,
            original_cursor_line: 1,
        }
    }

    fn advance(&mut self, text: &str) {
        let newlines = count_newlines(text);
        if newlines > 0 {
            self.line += newlines;
            let tail = text.rsplit('\n').next().unwrap_or_default();
            self.column = tail.chars().count() + 1;
        } else {
            self.column += text.chars().count();
        }
    }
}

/// First original line not yet covered by `generated`.
///
/// When the last change reaches the end of the original, its first original
/// line is still pending. Otherwise the generation has already matched the
/// original's tail and every line is consumed.
pub fn original_frontier(original: &str, generated: &str) -> usize {
    let original_lines = line_height(original);
    match diff_lines(original, generated).last() {
        Some(op) if op.original_end_line >= original_lines => op.original_start_line,
        _ => original_lines + 1,
    }
}

/// Incremental writer into one destination range.
#[derive(Debug, Clone)]
pub(crate) struct StreamWriter {
    pub(crate) cursor: StreamCursor,
    original: String,
    written: String,
}

impl StreamWriter {
    pub(crate) fn new(start_line: usize, original: impl Into<String>) -> Self {
        Self {
            cursor: StreamCursor::new(start_line),
            original: original.into(),
            written: String::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RewriteSession {
    pub(crate) document: Url,
    pub(crate) writer: StreamWriter,
    pub(crate) checkpoint: EditCheckpoint,
    pub(crate) request: RequestHandle,
}

impl Engine {
    /// Start streaming a rewrite of `[start_line, end_line]`.
    pub fn start_rewrite(
        &mut self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
        request: RequestHandle,
    ) -> EngineResult<RegionId> {
        self.begin_stream(uri, start_line, end_line, request, None)
    }

    /// Start streaming a rewrite of the lines under a prompt zone.
    pub fn start_quick_edit(
        &mut self,
        prompt_zone: RegionId,
        request: RequestHandle,
    ) -> EngineResult<RegionId> {
        let region = self.region_or_err(prompt_zone)?;
        if region.as_prompt_zone().is_none() {
            return Err(EngineError::invalid_state(format!(
                "{} is not a prompt zone",
                prompt_zone
            )));
        }
        let (uri, start_line, end_line) =
            (region.document.clone(), region.start_line, region.end_line);
        self.begin_stream(&uri, start_line, end_line, request, Some(prompt_zone))
    }

    fn begin_stream(
        &mut self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
        request: RequestHandle,
        prompt_zone: Option<RegionId>,
    ) -> EngineResult<RegionId> {
        self.ensure_no_stream(uri)?;
        let (start_line, end_line) = self.clamp_lines(uri, start_line, end_line)?;
        let ignore: Vec<RegionId> = prompt_zone.into_iter().collect();
        self.ensure_no_overlap(uri, start_line, end_line, &ignore)?;

        let checkpoint = self.begin_edit(uri)?;
        let baseline = self.lines_text(uri, start_line, end_line)?;
        let mut zone = EditZone::new(baseline.clone());
        zone.stream_state = StreamState::Streaming {
            cursor_line: start_line,
            request: request.clone(),
            cached_blocks: None,
        };
        let id = self
            .store
            .create(uri, start_line, end_line, RegionKind::EditZone(zone));

        if let Some(prompt) = prompt_zone
            && let Some(RegionKind::PromptZone(p)) = self.store.get_mut(prompt).map(|r| &mut r.kind)
        {
            p.linked_edit_zone = Some(id);
        }

        self.rewrite_sessions.insert(
            id,
            RewriteSession {
                document: uri.clone(),
                writer: StreamWriter::new(start_line, baseline),
                checkpoint,
                request,
            },
        );
        info!(
            target: STREAM_TARGET,
            "Streaming rewrite {} of {} lines {}-{}", id, uri, start_line, end_line
        );
        self.events.emit(EngineEvent::StreamingStateChanged {
            document: uri.clone(),
            region: id,
        });
        Ok(id)
    }

    /// Write the next cumulative output of a rewrite.
    pub fn stream_delta(&mut self, zone: RegionId, full_text: &str) -> EngineResult<()> {
        let mut session = self
            .rewrite_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        let uri = session.document.clone();
        let text = self.visible_output(full_text);

        let result = self.advance_writer(&uri, &mut session.writer, &text);
        self.set_cursor_line(zone, session.writer.cursor.line);
        self.rewrite_sessions.insert(zone, session);
        result?;
        self.refresh_document(&uri)
    }

    /// Replace the zone with the final output and stop streaming.
    pub fn finish_stream(&mut self, zone: RegionId, full_text: &str) -> EngineResult<()> {
        let session = self
            .rewrite_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        let uri = session.document.clone();
        let text = self.visible_output(full_text);

        let region = self.region_or_err(zone)?;
        let range = TextRange::lines(region.start_line, region.end_line);
        self.write_text(&uri, range, &text, true)?;
        self.set_idle(zone);
        info!(target: STREAM_TARGET, "Finished rewrite {}", zone);
        self.events.emit(EngineEvent::StreamingStateChanged {
            document: uri.clone(),
            region: zone,
        });
        self.refresh_document(&uri)?;
        self.finish_edit(session.checkpoint);
        Ok(())
    }

    /// Stop a stream, keeping whatever it already wrote.
    pub fn abort_stream(&mut self, zone: RegionId) -> EngineResult<()> {
        if let Some(session) = self.rewrite_sessions.remove(&zone) {
            session.request.cancel();
            self.set_idle(zone);
            info!(target: STREAM_TARGET, "Aborted rewrite {}", zone);
            self.events.emit(EngineEvent::StreamingStateChanged {
                document: session.document.clone(),
                region: zone,
            });
            self.refresh_document(&session.document)?;
            self.finish_edit(session.checkpoint);
            return Ok(());
        }
        if self.patch_sessions.contains_key(&zone) {
            return self.abort_patch_stream(zone);
        }
        Err(EngineError::StreamNotActive(zone))
    }

    /// Abort every stream on the document.
    pub(crate) fn abort_document_streams(&mut self, uri: &Url) -> EngineResult<()> {
        let streaming: Vec<RegionId> = self
            .store
            .iter_document(uri)
            .filter(|r| r.is_streaming())
            .map(|r| r.id)
            .collect();
        for zone in streaming {
            match self.abort_stream(zone) {
                Ok(()) | Err(EngineError::StreamNotActive(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Drop every stream on the document without touching history or the buffer.
    pub(crate) fn cancel_document_streams(&mut self, uri: &Url) {
        let rewrites: Vec<RegionId> = self
            .rewrite_sessions
            .iter()
            .filter(|(_, s)| &s.document == uri)
            .map(|(id, _)| *id)
            .collect();
        for zone in rewrites {
            if let Some(session) = self.rewrite_sessions.remove(&zone) {
                session.request.cancel();
                self.set_idle(zone);
            }
        }

        let patches: Vec<RegionId> = self
            .patch_sessions
            .iter()
            .filter(|(_, s)| &s.document == uri)
            .map(|(id, _)| *id)
            .collect();
        for zone in patches {
            if let Some(session) = self.patch_sessions.remove(&zone) {
                session.request.cancel();
                self.delete_tracking_zones(&session.tracking_zones());
                self.set_idle(zone);
            }
        }
    }

    pub(crate) fn set_idle(&mut self, zone: RegionId) {
        if let Some(edit_zone) = self.store.get_mut(zone).and_then(Region::as_edit_zone_mut) {
            edit_zone.stream_state = StreamState::Idle;
        }
    }

    pub(crate) fn set_cursor_line(&mut self, zone: RegionId, line: usize) {
        if let Some(edit_zone) = self.store.get_mut(zone).and_then(Region::as_edit_zone_mut)
            && let StreamState::Streaming { cursor_line, .. } = &mut edit_zone.stream_state
        {
            *cursor_line = line;
        }
    }

    /// Keep stream cursors on their logical line when the user edits above them.
    pub(crate) fn shift_stream_cursors(&mut self, uri: &Url, edit: &LineEdit) {
        let mut moved = Vec::new();
        for (zone, session) in self.rewrite_sessions.iter_mut() {
            if &session.document == uri && edit.end_line < session.writer.cursor.line {
                let cursor = &mut session.writer.cursor;
                cursor.line = (cursor.line as i64 + edit.delta()).max(1) as usize;
                moved.push((*zone, cursor.line));
            }
        }
        for (zone, session) in self.patch_sessions.iter_mut() {
            if &session.document == uri
                && let Some(writer) = session.active_writer_mut()
                && edit.end_line < writer.cursor.line
            {
                writer.cursor.line = (writer.cursor.line as i64 + edit.delta()).max(1) as usize;
                moved.push((*zone, writer.cursor.line));
            }
        }
        for (zone, line) in moved {
            self.set_cursor_line(zone, line);
        }
    }

    fn visible_output(&self, full_text: &str) -> String {
        if self.settings().stream.strip_code_fences {
            extract_code(full_text).to_string()
        } else {
            full_text.to_string()
        }
    }

    /// Type the new part of `full_text` and reconcile the original remainder.
    pub(crate) fn advance_writer(
        &mut self,
        uri: &Url,
        writer: &mut StreamWriter,
        full_text: &str,
    ) -> EngineResult<()> {
        let Some(delta) = full_text.strip_prefix(writer.written.as_str()) else {
            debug!(
                target: STREAM_TARGET,
                "Output is not a continuation; waiting for completion"
            );
            return Ok(());
        };
        if delta.is_empty() {
            return Ok(());
        }
        let delta = delta.to_string();
        let target = original_frontier(&writer.original, full_text);

        if !writer.cursor.added_leading_newline {
            let at = TextRange::at(Position::new(writer.cursor.line, 1));
            self.write_text(uri, at, "\n", true)?;
            writer.cursor.added_leading_newline = true;
        }

        let at = TextRange::at(Position::new(writer.cursor.line, writer.cursor.column));
        self.write_text(uri, at, &delta, true)?;
        writer.cursor.advance(&delta);

        let cursor = writer.cursor;
        if cursor.original_cursor_line < target {
            let consumed = target - cursor.original_cursor_line;
            let range = TextRange::new(
                Position::new(cursor.line + 1, 1),
                Position::new(cursor.line + 1 + consumed, 1),
            );
            self.write_text(uri, range, "", true)?;
        } else if cursor.original_cursor_line > target {
            let restored = slice_lines(&writer.original, target, cursor.original_cursor_line - 1);
            let at = TextRange::at(Position::new(cursor.line, cursor.column));
            self.write_text(uri, at, &format!("\n{}", restored), true)?;
        }
        debug!(
            target: STREAM_TARGET,
            "Delta of {} bytes, original {} -> {}",
            delta.len(),
            cursor.original_cursor_line,
            target
        );
        writer.cursor.original_cursor_line = target;
        writer.written = full_text.to_string();
        Ok(())
    }
}
