//! The engine: one owner for documents, regions, history and streams.
//!
//! Every buffer mutation the engine makes goes through [`Engine::write_text`],
//! which holds a [`WriteGuard`] while the buffer is edited so the buffer's
//! change listener can tell engine writes from user typing. User changes are
//! queued by the listener and realigned by [`Engine::sync_user_changes`].
//!
//! Submodules add the remaining operations as further `impl Engine` blocks:
//! - `refresh`: diff recomputation and event emission
//! - `history`: checkpoints, undo and redo
//! - `review`: accept and reject
//! - `zones`: prompt zones and manually tracked edit zones
//! - `streaming`: the streaming rewrite writer
//! - `patch_stream`: atomic and streaming structured patches

pub mod events;
pub mod history;
pub mod patch_stream;
pub mod refresh;
pub mod review;
pub mod streaming;
pub mod zones;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use url::Url;

pub use events::{EngineEvent, EventHub};
pub use history::{EditCheckpoint, HistoryManager, RegionSnapshot, RegionSnapshotKind, Snapshot};
pub use patch_stream::PatchProgress;
pub use review::AcceptRejectBehavior;
pub use streaming::StreamCursor;

use crate::config::{EngineSettings, SettingsManager};
use crate::error::{EngineError, EngineResult};
use crate::region::{LineEdit, LineSpan, Region, RegionId, RegionStore, realign_span};
use crate::text::{BufferChange, END_OF_LINE, Position, TextBuffer, TextRange};

use patch_stream::PatchSession;
use streaming::RewriteSession;

const LOG_TARGET: &str = "zonediff::engine";

/// Marks the engine as the author of buffer changes for its lifetime.
pub struct WriteGuard {
    flag: Arc<AtomicBool>,
}

impl WriteGuard {
    pub fn new(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self {
            flag: Arc::clone(flag),
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct DocumentEntry {
    buffer: Box<dyn TextBuffer>,
    writing: Arc<AtomicBool>,
    changes: UnboundedReceiver<BufferChange>,
}

pub struct Engine {
    store: RegionStore,
    documents: HashMap<Url, DocumentEntry>,
    history: HistoryManager,
    events: EventHub,
    settings: Arc<SettingsManager>,
    rewrite_sessions: HashMap<RegionId, RewriteSession>,
    patch_sessions: HashMap<RegionId, PatchSession>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("documents", &self.documents.keys().collect::<Vec<_>>())
            .field("regions", &self.store.len())
            .field("rewrite_sessions", &self.rewrite_sessions.len())
            .field("patch_sessions", &self.patch_sessions.len())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(SettingsManager::default()))
    }
}

impl Engine {
    pub fn new(settings: Arc<SettingsManager>) -> Self {
        Self {
            store: RegionStore::new(),
            documents: HashMap::new(),
            history: HistoryManager::default(),
            events: EventHub::default(),
            settings,
            rewrite_sessions: HashMap::new(),
            patch_sessions: HashMap::new(),
        }
    }

    pub fn settings_manager(&self) -> Arc<SettingsManager> {
        Arc::clone(&self.settings)
    }

    pub fn settings(&self) -> Arc<EngineSettings> {
        self.settings.settings()
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.store.get(id)
    }

    /// Regions of a document, in creation order.
    pub fn regions(&self, uri: &Url) -> Vec<&Region> {
        self.store.iter_document(uri).collect()
    }

    /// Start tracking `buffer` under `uri`, replacing any previous document.
    pub fn open_document(&mut self, uri: Url, mut buffer: Box<dyn TextBuffer>) {
        if self.documents.contains_key(&uri) {
            self.close_document(&uri);
        }
        let writing = Arc::new(AtomicBool::new(false));
        let (tx, changes) = unbounded_channel();
        let flag = Arc::clone(&writing);
        buffer.set_change_listener(Box::new(move |change: &BufferChange| {
            if !flag.load(Ordering::SeqCst) {
                // Receiver lives as long as the document entry
                let _ = tx.send(change.clone());
            }
        }));
        info!(target: LOG_TARGET, "Opened {}", uri);
        self.documents.insert(
            uri,
            DocumentEntry {
                buffer,
                writing,
                changes,
            },
        );
    }

    /// Stop tracking a document: cancels its streams, drops its regions and history.
    pub fn close_document(&mut self, uri: &Url) -> Option<Box<dyn TextBuffer>> {
        self.cancel_document_streams(uri);
        self.store.clear_document(uri);
        self.history.clear(uri);
        let entry = self.documents.remove(uri)?;
        info!(target: LOG_TARGET, "Closed {}", uri);
        Some(entry.buffer)
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn document_text(&self, uri: &Url) -> EngineResult<String> {
        Ok(self.document(uri)?.buffer.text())
    }

    pub fn line_count(&self, uri: &Url) -> EngineResult<usize> {
        Ok(self.document(uri)?.buffer.line_count())
    }

    fn document(&self, uri: &Url) -> EngineResult<&DocumentEntry> {
        self.documents
            .get(uri)
            .ok_or_else(|| EngineError::document_not_found(uri.as_str()))
    }

    fn document_mut(&mut self, uri: &Url) -> EngineResult<&mut DocumentEntry> {
        self.documents
            .get_mut(uri)
            .ok_or_else(|| EngineError::document_not_found(uri.as_str()))
    }

    pub(crate) fn region_or_err(&self, id: RegionId) -> EngineResult<&Region> {
        self.store.get(id).ok_or(EngineError::RegionNotFound(id))
    }

    /// Replace `range` with `text` as an engine write.
    ///
    /// With `realign`, every region of the document is shifted by the line
    /// edit. Snapshot restores pass `false` because they rebuild regions with
    /// their final bounds.
    pub fn write_text(
        &mut self,
        uri: &Url,
        range: TextRange,
        text: &str,
        realign: bool,
    ) -> EngineResult<()> {
        let entry = self.document_mut(uri)?;
        let line_count = entry.buffer.line_count();
        let start_line = range.start.line.clamp(1, line_count);
        let end_line = range.end.line.max(range.start.line).clamp(1, line_count);
        {
            let _guard = WriteGuard::new(&entry.writing);
            entry.buffer.apply_edit(range, text);
        }

        if realign {
            let edit = LineEdit::new(start_line, end_line, text);
            self.realign_document(uri, &edit);
        }
        Ok(())
    }

    /// Overwrite the whole document.
    pub(crate) fn write_whole_document(
        &mut self,
        uri: &Url,
        text: &str,
        realign: bool,
    ) -> EngineResult<()> {
        let line_count = self.line_count(uri)?;
        let range = TextRange::new(Position::new(1, 1), Position::new(line_count, END_OF_LINE));
        self.write_text(uri, range, text, realign)
    }

    /// Apply a user edit to the buffer directly and realign for it.
    ///
    /// Hosts whose buffers are edited elsewhere call [`Engine::sync_user_changes`]
    /// instead.
    pub fn user_edit(&mut self, uri: &Url, range: TextRange, text: &str) -> EngineResult<()> {
        self.document_mut(uri)?.buffer.apply_edit(range, text);
        self.sync_user_changes(uri).map(|_| ())
    }

    /// Realign regions for every queued user change, then refresh.
    ///
    /// Returns the number of changes processed.
    pub fn sync_user_changes(&mut self, uri: &Url) -> EngineResult<usize> {
        let entry = self.document_mut(uri)?;
        let mut changes = Vec::new();
        while let Ok(change) = entry.changes.try_recv() {
            changes.push(change);
        }
        if changes.is_empty() {
            return Ok(0);
        }

        for change in &changes {
            let edit = LineEdit::from(change);
            debug!(
                target: LOG_TARGET,
                "User edit on {} lines {}-{} (delta {})",
                uri, edit.start_line, edit.end_line, edit.delta()
            );
            self.realign_document(uri, &edit);
            self.shift_stream_cursors(uri, &edit);
        }
        self.refresh_document(uri)?;
        Ok(changes.len())
    }

    fn realign_document(&mut self, uri: &Url, edit: &LineEdit) {
        for id in self.store.regions_of(uri) {
            if let Some(region) = self.store.get_mut(id) {
                let span = realign_span(LineSpan::new(region.start_line, region.end_line), edit);
                region.start_line = span.start_line;
                region.end_line = span.end_line;
            }
        }
    }

    /// Whether any zone on the document is streaming.
    pub fn is_streaming(&self, uri: &Url) -> bool {
        self.store.iter_document(uri).any(Region::is_streaming)
    }

    pub(crate) fn ensure_no_stream(&self, uri: &Url) -> EngineResult<()> {
        if self.is_streaming(uri) {
            return Err(EngineError::StreamAlreadyActive {
                uri: uri.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_no_overlap(
        &self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
        ignore: &[RegionId],
    ) -> EngineResult<()> {
        match self
            .store
            .find_overlapping(uri, start_line, end_line, ignore)
        {
            Some(existing) => Err(EngineError::RegionOverlap {
                start_line,
                end_line,
                existing,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::MemoryBuffer;

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///test/{}.rs", name)).unwrap()
    }

    fn engine_with(uri: &Url, text: &str) -> Engine {
        let mut engine = Engine::default();
        engine.open_document(uri.clone(), Box::new(MemoryBuffer::new(text)));
        engine
    }

    #[test]
    fn test_write_guard_resets_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        {
            let _guard = WriteGuard::new(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_engine_writes_are_not_queued_as_user_changes() {
        let uri = test_uri("engine_write");
        let mut engine = engine_with(&uri, "a\nb\nc");
        engine
            .write_text(&uri, TextRange::lines(2, 2), "B", true)
            .unwrap();
        assert_eq!(engine.sync_user_changes(&uri).unwrap(), 0);
        assert_eq!(engine.document_text(&uri).unwrap(), "a\nB\nc");
    }

    #[test]
    fn test_user_edit_shifts_regions_once() {
        let uri = test_uri("user_edit");
        let mut engine = engine_with(&uri, "a\nb\nc\nd\ne");
        let zone = engine.add_edit_zone(&uri, 4, 5).unwrap();
        engine.user_edit(&uri, TextRange::lines(4, 4), "D").unwrap();

        engine
            .user_edit(&uri, TextRange::at(Position::new(1, 1)), "new\n")
            .unwrap();

        let region = engine.region(zone).unwrap();
        assert_eq!((region.start_line, region.end_line), (5, 6));
    }

    #[test]
    fn test_unknown_document_is_an_error() {
        let mut engine = Engine::default();
        let err = engine
            .write_text(&test_uri("missing"), TextRange::lines(1, 1), "x", true)
            .unwrap_err();
        assert!(matches!(err, EngineError::DocumentNotFound { .. }));
    }

    #[test]
    fn test_close_document_drops_regions() {
        let uri = test_uri("close");
        let mut engine = engine_with(&uri, "a\nb");
        engine.add_edit_zone(&uri, 1, 2).unwrap();
        assert!(engine.close_document(&uri).is_some());
        assert!(engine.regions(&uri).is_empty());
        assert!(!engine.is_open(&uri));
    }
}
