//! Accept and reject.
//!
//! Accepting folds a diff into the zone's baseline; the buffer is untouched.
//! Rejecting writes the baseline text back into the buffer. Either way the
//! following refresh drops the diff, and the zone once it has none left.

use log::{debug, info};
use url::Url;

use super::{Engine, LOG_TARGET};
use crate::diff::DiffKind;
use crate::error::{EngineError, EngineResult};
use crate::region::{Diff, DiffId, Region, RegionId};
use crate::text::{END_OF_LINE, Position, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRejectBehavior {
    Accept,
    Reject,
}

/// Splice `diff` into `baseline` at its original coordinates.
fn splice_baseline(baseline: &str, diff: &Diff) -> String {
    let mut lines: Vec<&str> = baseline.split('\n').collect();
    let start = diff.original_start_line.saturating_sub(1).min(lines.len());
    let replacement: Vec<&str> = match diff.kind {
        DiffKind::Deletion => Vec::new(),
        DiffKind::Insertion | DiffKind::Edit => diff.code.split('\n').collect(),
    };
    let end = match diff.kind {
        DiffKind::Insertion => start,
        DiffKind::Deletion | DiffKind::Edit => diff.original_end_line.min(lines.len()).max(start),
    };
    lines.splice(start..end, replacement);
    lines.join("\n")
}

impl Engine {
    fn live_diff(&self, id: DiffId) -> EngineResult<(Diff, Region)> {
        let diff = self.store.diff(id).cloned().ok_or(EngineError::DiffNotFound(id))?;
        let region = self.region_or_err(diff.region)?.clone();
        if region.is_streaming() {
            return Err(EngineError::invalid_state(format!(
                "cannot review {} while {} is streaming",
                id, region.id
            )));
        }
        Ok((diff, region))
    }

    /// Fold one diff into the baseline.
    pub fn accept_diff(&mut self, id: DiffId) -> EngineResult<()> {
        let (diff, region) = self.live_diff(id)?;
        let checkpoint = self.begin_edit(&region.document)?;
        self.accept_diff_inner(&diff)?;
        self.refresh_document(&region.document)?;
        self.finish_edit(checkpoint);
        Ok(())
    }

    /// Write one diff's baseline text back into the buffer.
    pub fn reject_diff(&mut self, id: DiffId) -> EngineResult<()> {
        let (diff, region) = self.live_diff(id)?;
        let checkpoint = self.begin_edit(&region.document)?;
        self.reject_diff_inner(&diff)?;
        self.refresh_document(&region.document)?;
        self.finish_edit(checkpoint);
        Ok(())
    }

    /// Mark a diff as included or excluded from bulk accept.
    pub fn set_diff_enabled(&mut self, id: DiffId, enabled: bool) -> EngineResult<()> {
        let diff = self.store.diff_mut(id).ok_or(EngineError::DiffNotFound(id))?;
        diff.enabled = enabled;
        Ok(())
    }

    /// Resolve every edit zone of the document, and optionally drop its prompt zones.
    pub fn accept_or_reject_all(
        &mut self,
        uri: &Url,
        behavior: AcceptRejectBehavior,
        include_prompt_zones: bool,
    ) -> EngineResult<()> {
        self.document(uri)?;
        let edit_zones: Vec<RegionId> = self
            .store
            .iter_document(uri)
            .filter(|r| r.as_edit_zone().is_some())
            .map(|r| r.id)
            .collect();
        let prompt_zones: Vec<RegionId> = if include_prompt_zones {
            self.store
                .iter_document(uri)
                .filter(|r| r.as_prompt_zone().is_some())
                .map(|r| r.id)
                .collect()
        } else {
            Vec::new()
        };
        if edit_zones.is_empty() && prompt_zones.is_empty() {
            return Ok(());
        }

        self.abort_document_streams(uri)?;
        info!(
            target: LOG_TARGET,
            "{:?} all on {} ({} zones)", behavior, uri, edit_zones.len()
        );

        let checkpoint = self.begin_edit(uri)?;
        // Bottom-up so earlier zones keep their coordinates
        let mut ordered = edit_zones;
        ordered.sort_by_key(|id| std::cmp::Reverse(self.store.get(*id).map_or(0, |r| r.start_line)));
        for id in ordered {
            self.resolve_zone(id, behavior)?;
        }
        for id in prompt_zones {
            self.store.delete(id);
        }
        self.refresh_document(uri)?;
        self.finish_edit(checkpoint);
        Ok(())
    }

    /// Accept every enabled diff of one zone and reject the disabled ones.
    pub fn accept_region(&mut self, id: RegionId) -> EngineResult<()> {
        self.review_region(id, AcceptRejectBehavior::Accept)
    }

    /// Restore one zone's baseline.
    pub fn reject_region(&mut self, id: RegionId) -> EngineResult<()> {
        self.review_region(id, AcceptRejectBehavior::Reject)
    }

    fn review_region(&mut self, id: RegionId, behavior: AcceptRejectBehavior) -> EngineResult<()> {
        let region = self.region_or_err(id)?;
        if region.as_edit_zone().is_none() {
            return Err(EngineError::invalid_state(format!("{} is not an edit zone", id)));
        }
        let uri = region.document.clone();
        if region.is_streaming() {
            self.abort_stream(id)?;
        }

        let checkpoint = self.begin_edit(&uri)?;
        self.resolve_zone(id, behavior)?;
        self.refresh_document(&uri)?;
        self.finish_edit(checkpoint);
        Ok(())
    }

    /// Resolve a zone without checkpointing or refreshing.
    pub(crate) fn resolve_zone(
        &mut self,
        id: RegionId,
        behavior: AcceptRejectBehavior,
    ) -> EngineResult<()> {
        let region = self.region_or_err(id)?.clone();
        let Some(zone) = region.as_edit_zone() else {
            return Ok(());
        };

        match behavior {
            AcceptRejectBehavior::Accept => {
                let mut diffs: Vec<Diff> = zone.diffs().cloned().collect();
                if diffs.iter().all(|d| d.enabled) {
                    self.delete_edit_zone(id);
                    return Ok(());
                }
                diffs.sort_by_key(|d| std::cmp::Reverse((d.start_line, d.original_start_line)));
                for diff in &diffs {
                    if diff.enabled {
                        self.accept_diff_inner(diff)?;
                    } else {
                        self.reject_diff_inner(diff)?;
                    }
                }
            }
            AcceptRejectBehavior::Reject => {
                self.write_text(
                    &region.document,
                    TextRange::lines(region.start_line, region.end_line),
                    &zone.original_code,
                    true,
                )?;
                self.delete_edit_zone(id);
            }
        }
        Ok(())
    }

    fn accept_diff_inner(&mut self, diff: &Diff) -> EngineResult<()> {
        let zone = self
            .store
            .get_mut(diff.region)
            .and_then(Region::as_edit_zone_mut)
            .ok_or(EngineError::RegionNotFound(diff.region))?;
        zone.original_code = splice_baseline(&zone.original_code, diff);
        self.store.remove_diff(diff.id);
        debug!(target: LOG_TARGET, "Accepted {}", diff.id);
        Ok(())
    }

    fn reject_diff_inner(&mut self, diff: &Diff) -> EngineResult<()> {
        let region = self.region_or_err(diff.region)?;
        let (zone_start, zone_end) = (region.start_line, region.end_line);
        let uri = region.document.clone();

        match diff.kind {
            DiffKind::Edit => {
                self.write_text(
                    &uri,
                    TextRange::lines(diff.start_line, diff.end_line),
                    &diff.original_code,
                    true,
                )?;
            }
            DiffKind::Insertion => {
                let range = if diff.end_line >= zone_end && diff.start_line > zone_start {
                    // Bottom of the zone: eat the newline before the insertion
                    TextRange::new(
                        Position::new(diff.start_line - 1, END_OF_LINE),
                        Position::new(diff.end_line, END_OF_LINE),
                    )
                } else if diff.end_line >= zone_end {
                    TextRange::lines(diff.start_line, diff.end_line)
                } else {
                    TextRange::new(
                        Position::new(diff.start_line, 1),
                        Position::new(diff.end_line + 1, 1),
                    )
                };
                self.write_text(&uri, range, "", true)?;
            }
            DiffKind::Deletion => {
                if diff.start_line <= zone_end {
                    self.write_text(
                        &uri,
                        TextRange::at(Position::new(diff.start_line, 1)),
                        &format!("{}\n", diff.original_code),
                        true,
                    )?;
                } else {
                    // Deleted at the bottom: append after the zone's last line
                    self.write_text(
                        &uri,
                        TextRange::at(Position::new(zone_end, END_OF_LINE)),
                        &format!("\n{}", diff.original_code),
                        true,
                    )?;
                }
            }
        }
        self.store.remove_diff(diff.id);
        debug!(target: LOG_TARGET, "Rejected {}", diff.id);
        Ok(())
    }
}
