//! Structured patches applied to a live document.
//!
//! Both paths turn the whole document into one edit zone whose baseline is
//! the pre-patch text, so every block shows up as reviewable diffs.
//!
//! The streaming path pins a tracking zone for each block once its ORIGINAL
//! section is complete and located, then streams the replacement into that
//! zone with the rewrite writer. A block that cannot be located reverts the
//! attempt and asks the caller to retry with a corrective message.

use log::{debug, info, warn};
use url::Url;

use super::streaming::StreamWriter;
use super::{AcceptRejectBehavior, EditCheckpoint, Engine, EngineEvent};
use crate::config::PatchSettings;
use crate::error::{EngineError, EngineResult};
use crate::patch::{SearchReplaceBlock, apply_patch, find_text_in_code, parse_blocks};
use crate::region::{
    EditZone, PatchBlockMeta, Region, RegionId, RegionKind, RequestHandle, StreamState,
    TrackingZone,
};
use crate::text::{TextRange, slice_lines};

const PATCH_TARGET: &str = "zonediff::patch";

/// Outcome of feeding patch output to the engine.
#[derive(Debug)]
pub enum PatchProgress {
    /// Output accepted; keep streaming.
    Streaming,
    /// The attempt was reverted; resend with a corrective message.
    Retry { reason: EngineError },
    /// Every block was applied and the stream is closed.
    Completed,
}

#[derive(Debug)]
struct PinnedBlock {
    tracking: RegionId,
    original_bounds: (usize, usize),
    original_height: usize,
    done: bool,
}

#[derive(Debug)]
pub(crate) struct PatchSession {
    pub(crate) document: Url,
    pub(crate) request: RequestHandle,
    checkpoint: EditCheckpoint,
    original_file: String,
    pinned: Vec<PinnedBlock>,
    /// Writer of the last pinned block while its replacement streams.
    writer: Option<StreamWriter>,
}

impl PatchSession {
    pub(crate) fn tracking_zones(&self) -> Vec<RegionId> {
        self.pinned.iter().map(|p| p.tracking).collect()
    }

    pub(crate) fn active_writer_mut(&mut self) -> Option<&mut StreamWriter> {
        self.writer.as_mut()
    }

    /// Original line after which the next block is searched.
    fn search_after(&self) -> usize {
        self.pinned.last().map_or(0, |p| p.original_bounds.1)
    }
}

impl Engine {
    /// Apply a complete patch to the document in one write.
    ///
    /// Location errors surface before anything is changed. Returns the edit
    /// zone holding the result, or `None` when the patch changed nothing.
    pub fn apply_patch_to_document(
        &mut self,
        uri: &Url,
        patch_text: &str,
        allow_fallback: bool,
    ) -> EngineResult<Option<RegionId>> {
        let before = self.document_text(uri)?;
        let mut patched = apply_patch(&before, patch_text, allow_fallback)?;

        let (checkpoint, original) = self.begin_whole_document_patch(uri)?;
        if original != before {
            // Accepting zones with disabled diffs rewrote part of the buffer
            patched = match apply_patch(&original, patch_text, allow_fallback) {
                Ok(text) => text,
                Err(err) => {
                    self.finish_edit(checkpoint);
                    return Err(err);
                }
            };
        }

        let zone = self.create_whole_document_zone(uri, &original, StreamState::Idle)?;
        self.write_whole_document(uri, &patched, true)?;
        self.refresh_document(uri)?;
        self.finish_edit(checkpoint);
        info!(target: PATCH_TARGET, "Applied patch to {}", uri);
        Ok(self.store.contains(zone).then_some(zone))
    }

    /// Start applying a patch as it streams. Returns the whole-document zone.
    pub fn start_patch_stream(
        &mut self,
        uri: &Url,
        request: RequestHandle,
    ) -> EngineResult<RegionId> {
        let (checkpoint, original) = self.begin_whole_document_patch(uri)?;
        let zone = self.create_whole_document_zone(
            uri,
            &original,
            StreamState::Streaming {
                cursor_line: 1,
                request: request.clone(),
                cached_blocks: None,
            },
        )?;
        self.patch_sessions.insert(
            zone,
            PatchSession {
                document: uri.clone(),
                request,
                checkpoint,
                original_file: original,
                pinned: Vec::new(),
                writer: None,
            },
        );
        info!(target: PATCH_TARGET, "Streaming patch {} on {}", zone, uri);
        self.events.emit(EngineEvent::StreamingStateChanged {
            document: uri.clone(),
            region: zone,
        });
        Ok(zone)
    }

    /// Feed the cumulative patch output.
    pub fn patch_delta(&mut self, zone: RegionId, full_text: &str) -> EngineResult<PatchProgress> {
        let mut session = self
            .patch_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        let blocks = parse_blocks(full_text);
        self.set_cached_blocks(zone, Some(blocks.clone()));

        let result = self.process_blocks(zone, &mut session, &blocks, false);
        let uri = session.document.clone();
        let progress = match result {
            Ok(()) => PatchProgress::Streaming,
            Err(err) if err.is_location_failure() => {
                warn!(target: PATCH_TARGET, "Patch attempt on {} failed: {}", uri, err);
                self.reset_patch_attempt(zone, &mut session)?;
                PatchProgress::Retry { reason: err }
            }
            Err(err) => {
                self.patch_sessions.insert(zone, session);
                return Err(err);
            }
        };
        self.patch_sessions.insert(zone, session);
        self.refresh_document(&uri)?;
        Ok(progress)
    }

    /// Apply the final patch output and close the stream.
    pub fn finish_patch_stream(
        &mut self,
        zone: RegionId,
        full_text: &str,
    ) -> EngineResult<PatchProgress> {
        let mut session = self
            .patch_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        let blocks = parse_blocks(full_text);

        let failure = match self.process_blocks(zone, &mut session, &blocks, true) {
            Ok(()) if session.pinned.is_empty() => Some(EngineError::NoBlocksFound),
            Ok(()) => None,
            Err(err) if err.is_location_failure() => Some(err),
            Err(err) => {
                self.patch_sessions.insert(zone, session);
                return Err(err);
            }
        };
        if let Some(reason) = failure {
            warn!(target: PATCH_TARGET, "Patch attempt {} failed: {}", zone, reason);
            self.reset_patch_attempt(zone, &mut session)?;
            let uri = session.document.clone();
            self.patch_sessions.insert(zone, session);
            self.refresh_document(&uri)?;
            return Ok(PatchProgress::Retry { reason });
        }

        let uri = session.document.clone();
        self.delete_tracking_zones(&session.tracking_zones());
        self.set_idle(zone);
        info!(
            target: PATCH_TARGET,
            "Finished patch {} ({} blocks)", zone, session.pinned.len()
        );
        self.events.emit(EngineEvent::StreamingStateChanged {
            document: uri.clone(),
            region: zone,
        });
        self.refresh_document(&uri)?;
        self.finish_edit(session.checkpoint);
        Ok(PatchProgress::Completed)
    }

    /// Revert to the pre-patch text and continue with a new request.
    pub fn restart_patch_stream(
        &mut self,
        zone: RegionId,
        request: RequestHandle,
    ) -> EngineResult<()> {
        let mut session = self
            .patch_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        let reset = self.reset_patch_attempt(zone, &mut session);
        session.request = request.clone();
        if let Some(edit_zone) = self.store.get_mut(zone).and_then(Region::as_edit_zone_mut) {
            edit_zone.stream_state = StreamState::Streaming {
                cursor_line: 1,
                request,
                cached_blocks: None,
            };
        }
        self.patch_sessions.insert(zone, session);
        debug!(target: PATCH_TARGET, "Restarted patch {}", zone);
        reset
    }

    pub(crate) fn abort_patch_stream(&mut self, zone: RegionId) -> EngineResult<()> {
        let session = self
            .patch_sessions
            .remove(&zone)
            .ok_or(EngineError::StreamNotActive(zone))?;
        session.request.cancel();
        self.delete_tracking_zones(&session.tracking_zones());
        self.set_idle(zone);
        info!(target: PATCH_TARGET, "Aborted patch {}", zone);
        self.events.emit(EngineEvent::StreamingStateChanged {
            document: session.document.clone(),
            region: zone,
        });
        self.refresh_document(&session.document)?;
        self.finish_edit(session.checkpoint);
        Ok(())
    }

    pub(crate) fn delete_tracking_zones(&mut self, zones: &[RegionId]) {
        for id in zones {
            self.store.delete(*id);
        }
    }

    /// Checkpoint, then accept every existing edit zone.
    fn begin_whole_document_patch(&mut self, uri: &Url) -> EngineResult<(EditCheckpoint, String)> {
        self.ensure_no_stream(uri)?;
        let line_count = self.line_count(uri)?;
        if let Some(prompt) = self
            .store
            .iter_document(uri)
            .find(|r| r.as_prompt_zone().is_some())
        {
            return Err(EngineError::RegionOverlap {
                start_line: 1,
                end_line: line_count,
                existing: prompt.id,
            });
        }

        let checkpoint = self.begin_edit(uri)?;
        let zones: Vec<RegionId> = self
            .store
            .iter_document(uri)
            .filter(|r| r.as_edit_zone().is_some())
            .map(|r| r.id)
            .collect();
        for id in zones {
            self.resolve_zone(id, AcceptRejectBehavior::Accept)?;
        }
        let original = self.document_text(uri)?;
        Ok((checkpoint, original))
    }

    fn create_whole_document_zone(
        &mut self,
        uri: &Url,
        original: &str,
        stream_state: StreamState,
    ) -> EngineResult<RegionId> {
        let line_count = self.line_count(uri)?;
        let mut zone = EditZone::new(original);
        zone.stream_state = stream_state;
        Ok(self
            .store
            .create(uri, 1, line_count, RegionKind::EditZone(zone)))
    }

    fn set_cached_blocks(&mut self, zone: RegionId, blocks: Option<Vec<SearchReplaceBlock>>) {
        if let Some(edit_zone) = self.store.get_mut(zone).and_then(Region::as_edit_zone_mut)
            && let StreamState::Streaming { cached_blocks, .. } = &mut edit_zone.stream_state
        {
            *cached_blocks = blocks;
        }
    }

    /// Cancel the request, drop the tracking zones and restore the pre-patch text.
    fn reset_patch_attempt(&mut self, zone: RegionId, session: &mut PatchSession) -> EngineResult<()> {
        session.request.cancel();
        self.delete_tracking_zones(&session.tracking_zones());
        session.pinned.clear();
        session.writer = None;
        self.set_cached_blocks(zone, None);

        if self.document_text(&session.document)? != session.original_file {
            self.write_whole_document(&session.document, &session.original_file, true)?;
        }
        Ok(())
    }

    fn process_blocks(
        &mut self,
        zone: RegionId,
        session: &mut PatchSession,
        blocks: &[SearchReplaceBlock],
        finishing: bool,
    ) -> EngineResult<()> {
        let settings = self.settings().patch.clone();
        let uri = session.document.clone();

        for (index, block) in blocks.iter().enumerate() {
            if index >= session.pinned.len() {
                if !block.has_full_search() {
                    self.check_partial_search(session, block, &settings)?;
                    break;
                }
                self.pin_block(session, block, &settings)?;
            }

            let pinned = &session.pinned[index];
            if pinned.done {
                continue;
            }
            let tracking = pinned.tracking;

            if block.is_done() || finishing {
                let region = self.region_or_err(tracking)?;
                let range = TextRange::lines(region.start_line, region.end_line);
                self.write_text(&uri, range, &block.replace, true)?;
                session.pinned[index].done = true;
                session.writer = None;
                debug!(target: PATCH_TARGET, "Block {} applied in {}", index + 1, zone);
            } else if let Some(mut writer) = session.writer.take() {
                let result = self.advance_writer(&uri, &mut writer, &block.replace);
                self.set_cursor_line(zone, writer.cursor.line);
                session.writer = Some(writer);
                result?;
            }
        }
        Ok(())
    }

    /// Fail early when a long enough partial ORIGINAL is already absent.
    fn check_partial_search(
        &self,
        session: &PatchSession,
        block: &SearchReplaceBlock,
        settings: &PatchSettings,
    ) -> EngineResult<()> {
        if block.search.trim().chars().count() < settings.min_search_chars {
            return Ok(());
        }
        match find_text_in_code(
            &block.search,
            &session.original_file,
            settings.whitespace_fallback,
            session.search_after(),
        ) {
            Err(err @ EngineError::NotFound { .. }) => Err(err),
            _ => Ok(()),
        }
    }

    fn pin_block(
        &mut self,
        session: &mut PatchSession,
        block: &SearchReplaceBlock,
        settings: &PatchSettings,
    ) -> EngineResult<()> {
        let found = find_text_in_code(
            &block.search,
            &session.original_file,
            settings.whitespace_fallback,
            session.search_after(),
        )?;
        let bounds = (found.start_line, found.end_line);
        // Searches start below the last pin, except an empty ORIGINAL, which
        // always lands on line 1
        if session
            .pinned
            .iter()
            .any(|p| bounds.0 <= p.original_bounds.1 && p.original_bounds.0 <= bounds.1)
        {
            return Err(EngineError::has_overlap(&block.search));
        }

        // Blocks above have already changed the height of their lines
        let shift: i64 = session
            .pinned
            .iter()
            .filter_map(|p| {
                let region = self.store.get(p.tracking)?;
                Some((region.end_line - region.start_line + 1) as i64 - p.original_height as i64)
            })
            .sum();
        let start_line = (found.start_line as i64 + shift).max(1) as usize;
        let end_line = start_line + (found.end_line - found.start_line);

        let tracking = self.store.create(
            &session.document,
            start_line,
            end_line,
            RegionKind::TrackingZone(TrackingZone {
                metadata: PatchBlockMeta {
                    original_bounds: bounds,
                    search: block.search.clone(),
                },
            }),
        );
        debug!(
            target: PATCH_TARGET,
            "Pinned block at original lines {}-{} as {}", bounds.0, bounds.1, tracking
        );
        session.pinned.push(PinnedBlock {
            tracking,
            original_bounds: bounds,
            original_height: found.end_line - found.start_line + 1,
            done: false,
        });
        session.writer = Some(StreamWriter::new(
            start_line,
            slice_lines(&session.original_file, found.start_line, found.end_line),
        ));
        Ok(())
    }
}
