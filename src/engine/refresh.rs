//! Diff recomputation.
//!
//! The refresh pass is the only place diffs are created and the only place
//! diff events are emitted. It runs after every logical write.

use std::collections::HashSet;

use log::debug;
use url::Url;

use super::{Engine, EngineEvent, LOG_TARGET};
use crate::diff::{DiffKind, diff_lines};
use crate::error::EngineResult;
use crate::region::{Diff, RegionId, RegionKind};
use crate::text::slice_lines;

/// Identity of a diff that survives recomputation.
type DiffSignature = (DiffKind, usize, usize, String);

fn signature(diff: &Diff) -> DiffSignature {
    (
        diff.kind,
        diff.original_start_line,
        diff.original_end_line,
        diff.code.clone(),
    )
}

impl Engine {
    /// Recompute the diffs of every edit zone on the document.
    ///
    /// Idle zones left without diffs are deleted.
    pub fn refresh_document(&mut self, uri: &Url) -> EngineResult<()> {
        let text = self.document_text(uri)?;

        let zone_ids: Vec<RegionId> = self
            .store
            .iter_document(uri)
            .filter(|r| r.as_edit_zone().is_some())
            .map(|r| r.id)
            .collect();

        for id in zone_ids {
            self.refresh_zone(uri, id, &text);
        }

        self.events.emit(EngineEvent::DiffZonesChanged {
            document: uri.clone(),
        });
        Ok(())
    }

    fn refresh_zone(&mut self, uri: &Url, id: RegionId, text: &str) {
        let Some(region) = self.store.get(id) else {
            return;
        };
        let Some(zone) = region.as_edit_zone() else {
            return;
        };
        let (start_line, end_line) = (region.start_line, region.end_line);
        let baseline = zone.original_code.clone();
        let streaming = zone.is_streaming();

        let disabled: HashSet<DiffSignature> = self
            .store
            .clear_diffs(id)
            .iter()
            .filter(|d| !d.enabled)
            .map(signature)
            .collect();

        let current = slice_lines(text, start_line, end_line);
        for hunk in diff_lines(&baseline, &current) {
            let diff = Diff {
                id: self.store.allocate_diff_id(),
                region: id,
                kind: hunk.kind,
                start_line: hunk.start_line + start_line - 1,
                end_line: (hunk.end_line + start_line).saturating_sub(1),
                original_start_line: hunk.original_start_line,
                original_end_line: hunk.original_end_line,
                code: hunk.code,
                original_code: hunk.original_code,
                enabled: true,
            };
            let enabled = !disabled.contains(&signature(&diff));
            self.store.insert_diff(Diff { enabled, ..diff });
        }

        if streaming {
            return;
        }

        let diff_count = self
            .store
            .get(id)
            .and_then(|r| r.as_edit_zone())
            .map_or(0, |z| z.diff_count());
        if diff_count == 0 {
            debug!(target: LOG_TARGET, "Deleting resolved zone {} on {}", id, uri);
            self.delete_edit_zone(id);
        } else {
            self.events.emit(EngineEvent::DiffsChangedWhileIdle {
                document: uri.clone(),
                region: id,
            });
        }
    }

    /// Delete an edit zone and unlink any prompt zone pointing at it.
    pub(crate) fn delete_edit_zone(&mut self, id: RegionId) {
        let Some(region) = self.store.delete(id) else {
            return;
        };
        let prompts: Vec<RegionId> = self
            .store
            .iter_document(&region.document)
            .filter(|r| {
                r.as_prompt_zone()
                    .is_some_and(|p| p.linked_edit_zone == Some(id))
            })
            .map(|r| r.id)
            .collect();
        for prompt in prompts {
            if let Some(RegionKind::PromptZone(zone)) =
                self.store.get_mut(prompt).map(|r| &mut r.kind)
            {
                zone.linked_edit_zone = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::diff::DiffKind;
    use crate::engine::{Engine, EngineEvent};
    use crate::text::{MemoryBuffer, TextRange};
    use url::Url;

    fn setup(text: &str) -> (Engine, Url) {
        let uri = Url::parse("file:///test/refresh.rs").unwrap();
        let mut engine = Engine::default();
        engine.open_document(uri.clone(), Box::new(MemoryBuffer::new(text)));
        (engine, uri)
    }

    #[test]
    fn test_insertion_inside_zone_is_reported_in_document_lines() {
        let (mut engine, uri) = setup("head\na\nb\nc");
        let zone = engine.add_edit_zone(&uri, 2, 4).unwrap();
        engine
            .user_edit(&uri, TextRange::lines(3, 3), "b\nb2")
            .unwrap();

        let region = engine.region(zone).unwrap();
        assert_eq!((region.start_line, region.end_line), (2, 5));
        let diffs: Vec<_> = region.as_edit_zone().unwrap().diffs().cloned().collect();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Insertion);
        assert_eq!((diffs[0].start_line, diffs[0].end_line), (4, 4));
        assert_eq!(diffs[0].original_start_line, 3);
        assert_eq!(diffs[0].code, "b2");
    }

    #[test]
    fn test_zone_without_changes_is_deleted() {
        let (mut engine, uri) = setup("a\nb");
        let zone = engine.add_edit_zone(&uri, 1, 2).unwrap();
        engine.refresh_document(&uri).unwrap();
        assert!(engine.region(zone).is_none());
    }

    #[test]
    fn test_disabled_flag_survives_identical_recompute() {
        let (mut engine, uri) = setup("a\nb\nc\nd");
        let zone = engine.add_edit_zone(&uri, 1, 4).unwrap();
        engine.user_edit(&uri, TextRange::lines(1, 1), "A").unwrap();
        engine.user_edit(&uri, TextRange::lines(4, 4), "D").unwrap();

        let first = engine
            .region(zone)
            .unwrap()
            .as_edit_zone()
            .unwrap()
            .diffs()
            .find(|d| d.code == "A")
            .unwrap()
            .id;
        engine.set_diff_enabled(first, false).unwrap();

        engine.user_edit(&uri, TextRange::lines(4, 4), "DD").unwrap();

        let zone = engine.region(zone).unwrap().as_edit_zone().unwrap();
        let a = zone.diffs().find(|d| d.code == "A").unwrap();
        let d = zone.diffs().find(|d| d.code == "DD").unwrap();
        assert!(!a.enabled, "unchanged diff keeps its disabled flag");
        assert!(d.enabled);
    }

    #[test]
    fn test_refresh_emits_events() {
        let (mut engine, uri) = setup("a\nb");
        let mut events = engine.subscribe();
        let zone = engine.add_edit_zone(&uri, 1, 2).unwrap();
        engine.user_edit(&uri, TextRange::lines(1, 1), "A").unwrap();

        let received: Vec<EngineEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert!(received.contains(&EngineEvent::DiffsChangedWhileIdle {
            document: uri.clone(),
            region: zone,
        }));
        assert!(received.contains(&EngineEvent::DiffZonesChanged { document: uri }));
    }
}
