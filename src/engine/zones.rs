use log::debug;
use url::Url;

use super::{Engine, LOG_TARGET};
use crate::error::{EngineError, EngineResult};
use crate::region::{EditZone, EditorId, PromptZone, RegionId, RegionKind};
use crate::text::TextRange;

impl Engine {
    /// Mount a prompt zone over `[start_line, end_line]`.
    pub fn add_prompt_zone(
        &mut self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
        editor: EditorId,
    ) -> EngineResult<RegionId> {
        let (start_line, end_line) = self.clamp_lines(uri, start_line, end_line)?;
        self.ensure_no_overlap(uri, start_line, end_line, &[])?;
        let id = self.store.create(
            uri,
            start_line,
            end_line,
            RegionKind::PromptZone(PromptZone {
                editor,
                linked_edit_zone: None,
                user_text: String::new(),
            }),
        );
        debug!(target: LOG_TARGET, "Prompt zone {} at {}-{}", id, start_line, end_line);
        Ok(id)
    }

    pub fn remove_prompt_zone(&mut self, id: RegionId) -> EngineResult<()> {
        if self.region_or_err(id)?.as_prompt_zone().is_none() {
            return Err(EngineError::invalid_state(format!("{} is not a prompt zone", id)));
        }
        self.store.delete(id);
        Ok(())
    }

    pub fn set_prompt_text(&mut self, id: RegionId, text: impl Into<String>) -> EngineResult<()> {
        match self.store.get_mut(id).map(|r| &mut r.kind) {
            Some(RegionKind::PromptZone(zone)) => {
                zone.user_text = text.into();
                Ok(())
            }
            Some(_) => Err(EngineError::invalid_state(format!("{} is not a prompt zone", id))),
            None => Err(EngineError::RegionNotFound(id)),
        }
    }

    /// Track `[start_line, end_line]` as an idle edit zone whose baseline is the current text.
    ///
    /// The zone disappears at the next refresh unless its lines change.
    pub fn add_edit_zone(
        &mut self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
    ) -> EngineResult<RegionId> {
        let (start_line, end_line) = self.clamp_lines(uri, start_line, end_line)?;
        self.ensure_no_overlap(uri, start_line, end_line, &[])?;
        let baseline = self.lines_text(uri, start_line, end_line)?;
        Ok(self.store.create(
            uri,
            start_line,
            end_line,
            RegionKind::EditZone(EditZone::new(baseline)),
        ))
    }

    pub(crate) fn clamp_lines(
        &self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
    ) -> EngineResult<(usize, usize)> {
        let line_count = self.line_count(uri)?;
        let start_line = start_line.clamp(1, line_count);
        let end_line = end_line.clamp(start_line, line_count);
        Ok((start_line, end_line))
    }

    pub(crate) fn lines_text(
        &self,
        uri: &Url,
        start_line: usize,
        end_line: usize,
    ) -> EngineResult<String> {
        let entry = self.document(uri)?;
        Ok(entry.buffer.text_in(TextRange::lines(start_line, end_line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::MemoryBuffer;

    fn setup(text: &str) -> (Engine, Url) {
        let uri = Url::parse("file:///test/zones.rs").unwrap();
        let mut engine = Engine::default();
        engine.open_document(uri.clone(), Box::new(MemoryBuffer::new(text)));
        (engine, uri)
    }

    #[test]
    fn test_overlapping_prompt_zones_are_rejected() {
        let (mut engine, uri) = setup("1\n2\n3\n4\n5");
        let first = engine.add_prompt_zone(&uri, 2, 3, EditorId(1)).unwrap();
        let err = engine
            .add_prompt_zone(&uri, 3, 4, EditorId(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::RegionOverlap { existing, .. } if existing == first));
        assert!(engine.add_prompt_zone(&uri, 4, 5, EditorId(2)).is_ok());
    }

    #[test]
    fn test_prompt_text_is_stored() {
        let (mut engine, uri) = setup("a");
        let zone = engine.add_prompt_zone(&uri, 1, 1, EditorId(7)).unwrap();
        engine.set_prompt_text(zone, "make it faster").unwrap();
        let prompt = engine.region(zone).unwrap().as_prompt_zone().unwrap();
        assert_eq!(prompt.user_text, "make it faster");
        assert_eq!(prompt.editor, EditorId(7));

        engine.remove_prompt_zone(zone).unwrap();
        assert!(engine.region(zone).is_none());
    }

    #[test]
    fn test_edit_zone_lines_are_clamped() {
        let (mut engine, uri) = setup("a\nb");
        let zone = engine.add_edit_zone(&uri, 2, 10).unwrap();
        let region = engine.region(zone).unwrap();
        assert_eq!((region.start_line, region.end_line), (2, 2));
        assert_eq!(region.as_edit_zone().unwrap().original_code, "b");
    }
}
