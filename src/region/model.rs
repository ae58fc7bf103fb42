//! Region and diff records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;
use url::Url;

use crate::diff::DiffKind;
use crate::patch::SearchReplaceBlock;

/// Process-lifetime unique region identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

/// Process-lifetime unique diff identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiffId(pub u64);

/// Opaque identifier of the editor instance a prompt zone is mounted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditorId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diff#{}", self.0)
    }
}

/// Handle of an in-flight LLM request.
///
/// Cloning shares the cancellation token, so cancelling any clone stops the
/// transport task that was given the handle.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    pub id: Ulid,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub fn new() -> Self {
        Self {
            id: Ulid::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Default for RequestHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an LLM is currently writing into an edit zone.
#[derive(Debug, Clone, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming {
        /// Document line the generation frontier is on.
        cursor_line: usize,
        request: RequestHandle,
        /// Last parsed structured-patch blocks, for patch streams.
        cached_blocks: Option<Vec<SearchReplaceBlock>>,
    },
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Streaming { .. })
    }
}

/// One pending change inside an edit zone, in document coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub id: DiffId,
    pub region: RegionId,
    pub kind: DiffKind,
    pub start_line: usize,
    pub end_line: usize,
    pub original_start_line: usize,
    pub original_end_line: usize,
    /// Replacement text currently in the buffer.
    pub code: String,
    /// Baseline text this diff replaces.
    pub original_code: String,
    pub enabled: bool,
}

/// A region whose buffer text is diffed against `original_code`.
#[derive(Debug, Clone, Default)]
pub struct EditZone {
    /// Current accepted baseline.
    pub original_code: String,
    pub(crate) diffs: BTreeMap<DiffId, Diff>,
    pub stream_state: StreamState,
}

impl EditZone {
    pub fn new(original_code: impl Into<String>) -> Self {
        Self {
            original_code: original_code.into(),
            diffs: BTreeMap::new(),
            stream_state: StreamState::Idle,
        }
    }

    pub fn diffs(&self) -> impl Iterator<Item = &Diff> {
        self.diffs.values()
    }

    pub fn diff_count(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_state.is_streaming()
    }
}

/// Author-facing "edit in place" region mounted in one editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptZone {
    pub editor: EditorId,
    /// Edit zone currently being rewritten on behalf of this prompt.
    pub linked_edit_zone: Option<RegionId>,
    /// Instructions typed into the prompt input.
    pub user_text: String,
}

/// Ephemeral destination range with caller-defined metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingZone<M> {
    pub metadata: M,
}

/// Metadata of the tracking zone pinned for one structured-patch block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlockMeta {
    /// Lines the block's ORIGINAL text occupies in the pre-patch file.
    pub original_bounds: (usize, usize),
    pub search: String,
}

#[derive(Debug, Clone)]
pub enum RegionKind {
    EditZone(EditZone),
    PromptZone(PromptZone),
    TrackingZone(TrackingZone<PatchBlockMeta>),
}

/// A line-addressed span of one document (1-indexed, inclusive).
#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub document: Url,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: RegionKind,
}

impl Region {
    pub fn as_edit_zone(&self) -> Option<&EditZone> {
        match &self.kind {
            RegionKind::EditZone(zone) => Some(zone),
            _ => None,
        }
    }

    pub fn as_edit_zone_mut(&mut self) -> Option<&mut EditZone> {
        match &mut self.kind {
            RegionKind::EditZone(zone) => Some(zone),
            _ => None,
        }
    }

    pub fn as_prompt_zone(&self) -> Option<&PromptZone> {
        match &self.kind {
            RegionKind::PromptZone(zone) => Some(zone),
            _ => None,
        }
    }

    pub fn as_tracking_zone(&self) -> Option<&TrackingZone<PatchBlockMeta>> {
        match &self.kind {
            RegionKind::TrackingZone(zone) => Some(zone),
            _ => None,
        }
    }

    /// Edit zones and prompt zones take part in the no-overlap invariant.
    pub fn is_exclusive(&self) -> bool {
        match self.kind {
            RegionKind::EditZone(_) | RegionKind::PromptZone(_) => true,
            RegionKind::TrackingZone(_) => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.as_edit_zone().is_some_and(EditZone::is_streaming)
    }

    pub fn overlaps(&self, start_line: usize, end_line: usize) -> bool {
        self.start_line <= end_line && start_line <= self.end_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start_line: usize, end_line: usize, kind: RegionKind) -> Region {
        Region {
            id: RegionId(1),
            document: Url::parse("file:///test/doc.rs").unwrap(),
            start_line,
            end_line,
            kind,
        }
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let r = region(3, 5, RegionKind::EditZone(EditZone::new("")));
        assert!(r.overlaps(5, 9));
        assert!(r.overlaps(1, 3));
        assert!(r.overlaps(4, 4));
        assert!(!r.overlaps(6, 9));
        assert!(!r.overlaps(1, 2));
    }

    #[test]
    fn test_tracking_zones_are_not_exclusive() {
        let tracking = region(
            1,
            2,
            RegionKind::TrackingZone(TrackingZone {
                metadata: PatchBlockMeta {
                    original_bounds: (1, 2),
                    search: "x".into(),
                },
            }),
        );
        assert!(!tracking.is_exclusive());
        assert!(region(1, 2, RegionKind::EditZone(EditZone::new(""))).is_exclusive());
    }

    #[test]
    fn test_request_handle_clones_share_cancellation() {
        let handle = RequestHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.id, clone.id);
    }
}
