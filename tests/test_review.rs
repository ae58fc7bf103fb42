//! Accept/reject flows over zones produced by user edits and LLM rewrites.

mod helpers;

use helpers::{ScriptedTransport, completed, delta, open_engine};
use zonediff::driver::{PromptOptions, run_quick_edit, shared};
use zonediff::{
    AcceptRejectBehavior, DiffKind, EditorId, EngineEvent, RequestHandle, TextRange, diff_lines,
};

/// Diffs recomputed from scratch for a zone.
fn rediff(engine: &zonediff::Engine, zone: zonediff::RegionId) -> usize {
    let region = engine.region(zone).unwrap();
    let text = engine.document_text(&region.document).unwrap();
    let current = zonediff::text::slice_lines(&text, region.start_line, region.end_line);
    diff_lines(&region.as_edit_zone().unwrap().original_code, &current).len()
}

#[test]
fn test_accepted_diff_disappears_from_rediff() {
    let (mut engine, uri) = open_engine("accept_rediff", "a\nb\nc\nd\ne");
    let zone = engine.add_edit_zone(&uri, 1, 5).unwrap();
    engine.user_edit(&uri, TextRange::lines(2, 2), "B").unwrap();
    engine
        .user_edit(&uri, TextRange::lines(4, 4), "d\nd2")
        .unwrap();
    assert_eq!(rediff(&engine, zone), 2);

    let insertion = engine
        .region(zone)
        .unwrap()
        .as_edit_zone()
        .unwrap()
        .diffs()
        .find(|d| d.kind == DiffKind::Insertion)
        .map(|d| d.id)
        .unwrap();
    engine.accept_diff(insertion).unwrap();

    assert_eq!(rediff(&engine, zone), 1);
    let edit_zone = engine.region(zone).unwrap().as_edit_zone().unwrap();
    assert_eq!(edit_zone.original_code, "a\nb\nc\nd\nd2\ne");
    assert_eq!(edit_zone.diff_count(), 1);
    assert_eq!(engine.document_text(&uri).unwrap(), "a\nB\nc\nd\nd2\ne");
}

#[test]
fn test_rejecting_every_diff_restores_text_and_removes_zone() {
    let original = "fn a() {\n    1\n}\n\nfn b() {}";
    let (mut engine, uri) = open_engine("reject_all_diffs", original);
    let zone = engine
        .start_rewrite(&uri, 1, 5, RequestHandle::new())
        .unwrap();
    engine
        .finish_stream(zone, "fn a() {\n    2\n    3\n}\n")
        .unwrap();

    while let Some(id) = engine
        .region(zone)
        .and_then(|r| r.as_edit_zone())
        .and_then(|z| z.diffs().next().map(|d| d.id))
    {
        engine.reject_diff(id).unwrap();
    }
    assert_eq!(engine.document_text(&uri).unwrap(), original);
    assert!(engine.region(zone).is_none());
}

#[test]
fn test_reject_region_leaves_other_zones_alone() {
    let (mut engine, uri) = open_engine("reject_region", "1\n2\n3\n4\n5\n6");
    // Untouched zones are dropped at the next refresh, so edit each right away
    let top = engine.add_edit_zone(&uri, 1, 2).unwrap();
    engine.user_edit(&uri, TextRange::lines(1, 1), "one").unwrap();
    let bottom = engine.add_edit_zone(&uri, 5, 6).unwrap();
    engine.user_edit(&uri, TextRange::lines(6, 6), "six").unwrap();

    engine.reject_region(bottom).unwrap();
    assert_eq!(engine.document_text(&uri).unwrap(), "one\n2\n3\n4\n5\n6");
    assert!(engine.region(bottom).is_none());
    assert!(engine.region(top).is_some());

    engine.accept_region(top).unwrap();
    assert!(engine.regions(&uri).is_empty());
    assert_eq!(engine.document_text(&uri).unwrap(), "one\n2\n3\n4\n5\n6");
}

#[test]
fn test_bulk_reject_twice_without_regions_is_noop() {
    let (mut engine, uri) = open_engine("bulk_noop", "x\ny");
    engine
        .accept_or_reject_all(&uri, AcceptRejectBehavior::Reject, true)
        .unwrap();
    engine
        .accept_or_reject_all(&uri, AcceptRejectBehavior::Reject, true)
        .unwrap();
    assert_eq!(engine.document_text(&uri).unwrap(), "x\ny");
    assert_eq!(engine.history().undo_depth(&uri), 0);
}

#[test]
fn test_bulk_accept_is_undoable() {
    let (mut engine, uri) = open_engine("bulk_undo", "a\nb");
    engine.add_edit_zone(&uri, 1, 2).unwrap();
    engine.user_edit(&uri, TextRange::lines(2, 2), "B").unwrap();

    engine
        .accept_or_reject_all(&uri, AcceptRejectBehavior::Accept, false)
        .unwrap();
    assert!(engine.regions(&uri).is_empty());

    assert!(engine.undo(&uri).unwrap());
    let regions = engine.regions(&uri);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].as_edit_zone().unwrap().diff_count(), 1);
}

#[tokio::test]
async fn test_quick_edit_then_accept_all_with_prompt_zones() {
    let (mut engine, uri) = open_engine("quick_edit", "let total = a+b;\nprint(total)");
    let prompt = engine.add_prompt_zone(&uri, 1, 1, EditorId(1)).unwrap();
    engine.set_prompt_text(prompt, "add spaces").unwrap();
    let mut events = engine.subscribe();
    let engine = shared(engine);

    let transport = ScriptedTransport::new(vec![vec![
        delta("```js\nlet total"),
        completed("```js\nlet total = a + b;\n```"),
    ]]);
    let options = PromptOptions {
        language: "js".into(),
        include_context: true,
    };
    let zone = run_quick_edit(&engine, &transport, prompt, &options)
        .await
        .unwrap();

    let requests = transport.requests();
    let user = &requests[0].messages[1].content;
    assert!(user.contains("add spaces"));
    assert!(user.contains("print(total)"), "suffix is sent as context");

    let mut engine = engine.lock().unwrap();
    assert_eq!(
        engine.document_text(&uri).unwrap(),
        "let total = a + b;\nprint(total)"
    );
    let linked = engine
        .region(prompt)
        .unwrap()
        .as_prompt_zone()
        .unwrap()
        .linked_edit_zone;
    assert_eq!(linked, Some(zone));

    let mut saw_streaming_change = false;
    let mut saw_idle_diffs = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::StreamingStateChanged { region, .. } => {
                saw_streaming_change |= region == zone
            }
            EngineEvent::DiffsChangedWhileIdle { region, .. } => saw_idle_diffs |= region == zone,
            EngineEvent::DiffZonesChanged { .. } => {}
        }
    }
    assert!(saw_streaming_change);
    assert!(saw_idle_diffs);

    engine
        .accept_or_reject_all(&uri, AcceptRejectBehavior::Accept, true)
        .unwrap();
    assert!(engine.regions(&uri).is_empty());
    assert_eq!(
        engine.document_text(&uri).unwrap(),
        "let total = a + b;\nprint(total)"
    );
}
