//! Checkpoints, undo and redo.
//!
//! A checkpoint captures the document text plus the shape of its edit and
//! prompt zones. Restoring one tears every region of the document down and
//! rebuilds from the snapshot; diffs are then recomputed by a refresh. Only
//! the identity of disabled diffs is stored, so their flag survives.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Engine;
use crate::diff::DiffKind;
use crate::error::EngineResult;
use crate::region::{Diff, DiffId, EditZone, EditorId, PromptZone, Region, RegionId, RegionKind};

const LOG_TARGET: &str = "zonediff::history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegionSnapshotKind {
    EditZone {
        original_code: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        disabled_diffs: Vec<DisabledDiff>,
    },
    PromptZone {
        editor: EditorId,
        linked_edit_zone: Option<RegionId>,
        user_text: String,
    },
}

/// A diff excluded from bulk accept, keyed on what recomputation preserves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledDiff {
    pub kind: DiffKind,
    pub original_start_line: usize,
    pub original_end_line: usize,
    pub code: String,
}

impl From<&Diff> for DisabledDiff {
    fn from(diff: &Diff) -> Self {
        Self {
            kind: diff.kind,
            original_start_line: diff.original_start_line,
            original_end_line: diff.original_end_line,
            code: diff.code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub id: RegionId,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: RegionSnapshotKind,
}

/// Document state at one point in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub regions: Vec<RegionSnapshot>,
    pub file_text: String,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    id: u64,
    before: Snapshot,
    /// Filled by `finish_edit`, or lazily at undo time.
    after: Option<Snapshot>,
}

#[derive(Debug, Default)]
struct DocumentHistory {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

/// Handle returned by [`Engine::begin_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCheckpoint {
    pub document: Url,
    entry: u64,
}

/// Per-document undo and redo stacks.
#[derive(Debug, Default)]
pub struct HistoryManager {
    documents: HashMap<Url, DocumentHistory>,
    next_entry: u64,
}

impl HistoryManager {
    fn push(&mut self, document: &Url, before: Snapshot) -> u64 {
        self.next_entry += 1;
        let id = self.next_entry;
        let history = self.documents.entry(document.clone()).or_default();
        history.undo.push(HistoryEntry {
            id,
            before,
            after: None,
        });
        history.redo.clear();
        id
    }

    fn complete(&mut self, document: &Url, entry: u64, after: Snapshot) -> bool {
        let Some(history) = self.documents.get_mut(document) else {
            return false;
        };
        match history.undo.iter_mut().rev().find(|e| e.id == entry) {
            Some(e) => {
                e.after = Some(after);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self, document: &Url) -> bool {
        self.documents
            .get(document)
            .is_some_and(|h| !h.undo.is_empty())
    }

    pub fn can_redo(&self, document: &Url) -> bool {
        self.documents
            .get(document)
            .is_some_and(|h| !h.redo.is_empty())
    }

    pub fn undo_depth(&self, document: &Url) -> usize {
        self.documents.get(document).map_or(0, |h| h.undo.len())
    }

    pub(crate) fn clear(&mut self, document: &Url) {
        self.documents.remove(document);
    }
}

impl Engine {
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Snapshot the document and push an undo entry.
    ///
    /// The redo stack is cleared. Call [`Engine::finish_edit`] once the
    /// operation is done.
    pub fn begin_edit(&mut self, uri: &Url) -> EngineResult<EditCheckpoint> {
        let before = self.capture_snapshot(uri)?;
        let entry = self.history.push(uri, before);
        debug!(target: LOG_TARGET, "Checkpoint {} on {}", entry, uri);
        Ok(EditCheckpoint {
            document: uri.clone(),
            entry,
        })
    }

    /// Record the state after the operation started by `checkpoint`.
    pub fn finish_edit(&mut self, checkpoint: EditCheckpoint) {
        let Ok(after) = self.capture_snapshot(&checkpoint.document) else {
            return;
        };
        if !self
            .history
            .complete(&checkpoint.document, checkpoint.entry, after)
        {
            debug!(
                target: LOG_TARGET,
                "Checkpoint {} no longer on the undo stack", checkpoint.entry
            );
        }
    }

    /// Undo the latest entry. Returns false when there is nothing to undo.
    pub fn undo(&mut self, uri: &Url) -> EngineResult<bool> {
        self.document(uri)?;
        // Aborting finishes the stream's checkpoint, so its entry gets an `after`
        self.abort_document_streams(uri)?;

        let Some(mut entry) = self
            .history
            .documents
            .get_mut(uri)
            .and_then(|h| h.undo.pop())
        else {
            return Ok(false);
        };
        if entry.after.is_none() {
            entry.after = Some(self.capture_snapshot(uri)?);
        }

        info!(target: LOG_TARGET, "Undo {} on {}", entry.id, uri);
        self.restore_snapshot(uri, &entry.before)?;
        self.history
            .documents
            .entry(uri.clone())
            .or_default()
            .redo
            .push(entry);
        Ok(true)
    }

    /// Redo the latest undone entry. Returns false when there is nothing to redo.
    pub fn redo(&mut self, uri: &Url) -> EngineResult<bool> {
        self.document(uri)?;
        self.abort_document_streams(uri)?;

        let Some(entry) = self
            .history
            .documents
            .get_mut(uri)
            .and_then(|h| h.redo.pop())
        else {
            return Ok(false);
        };

        info!(target: LOG_TARGET, "Redo {} on {}", entry.id, uri);
        if let Some(after) = &entry.after {
            self.restore_snapshot(uri, after)?;
        }
        self.history
            .documents
            .entry(uri.clone())
            .or_default()
            .undo
            .push(entry);
        Ok(true)
    }

    pub fn capture_snapshot(&self, uri: &Url) -> EngineResult<Snapshot> {
        let file_text = self.document_text(uri)?;
        let regions = self
            .store
            .iter_document(uri)
            .filter_map(|region| {
                let kind = match &region.kind {
                    RegionKind::EditZone(zone) => RegionSnapshotKind::EditZone {
                        original_code: zone.original_code.clone(),
                        disabled_diffs: zone
                            .diffs()
                            .filter(|d| !d.enabled)
                            .map(DisabledDiff::from)
                            .collect(),
                    },
                    RegionKind::PromptZone(zone) => RegionSnapshotKind::PromptZone {
                        editor: zone.editor,
                        linked_edit_zone: zone.linked_edit_zone,
                        user_text: zone.user_text.clone(),
                    },
                    RegionKind::TrackingZone(_) => return None,
                };
                Some(RegionSnapshot {
                    id: region.id,
                    start_line: region.start_line,
                    end_line: region.end_line,
                    kind,
                })
            })
            .collect();
        Ok(Snapshot { regions, file_text })
    }

    /// Tear down every region of the document and rebuild from `snapshot`.
    pub fn restore_snapshot(&mut self, uri: &Url, snapshot: &Snapshot) -> EngineResult<()> {
        self.cancel_document_streams(uri);
        self.store.clear_document(uri);

        for region in &snapshot.regions {
            let kind = match &region.kind {
                RegionSnapshotKind::EditZone { original_code, .. } => {
                    RegionKind::EditZone(EditZone::new(original_code.clone()))
                }
                RegionSnapshotKind::PromptZone {
                    editor,
                    linked_edit_zone,
                    user_text,
                } => RegionKind::PromptZone(PromptZone {
                    editor: *editor,
                    linked_edit_zone: *linked_edit_zone,
                    user_text: user_text.clone(),
                }),
            };
            self.store.restore(Region {
                id: region.id,
                document: uri.clone(),
                start_line: region.start_line,
                end_line: region.end_line,
                kind,
            });
        }

        self.write_whole_document(uri, &snapshot.file_text, false)?;
        self.refresh_document(uri)?;
        self.restore_disabled_diffs(snapshot);
        Ok(())
    }

    fn restore_disabled_diffs(&mut self, snapshot: &Snapshot) {
        for region in &snapshot.regions {
            let RegionSnapshotKind::EditZone { disabled_diffs, .. } = &region.kind else {
                continue;
            };
            if disabled_diffs.is_empty() {
                continue;
            }
            let matching: Vec<DiffId> = self
                .store
                .get(region.id)
                .and_then(Region::as_edit_zone)
                .into_iter()
                .flat_map(|zone| zone.diffs())
                .filter(|d| disabled_diffs.contains(&DisabledDiff::from(*d)))
                .map(|d| d.id)
                .collect();
            for id in matching {
                if let Some(diff) = self.store.diff_mut(id) {
                    diff.enabled = false;
                }
            }
        }
    }
}
