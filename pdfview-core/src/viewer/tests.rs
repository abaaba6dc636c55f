use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::backend::{Annotation, AnnotationColors, AnnotationKind, LinkAction};
use crate::geometry::Quad;
use crate::overlay::CaptureStage;
use crate::testing::{glyph_center, FakeBackend, FakePage, FakeProvider};

fn config() -> ViewerConfig {
    ViewerConfig {
        page_padding: 0.0,
        ..ViewerConfig::default()
    }
}

fn viewer_for(backend: Arc<FakeBackend>) -> Viewer {
    Viewer::new(backend, config(), HostTheme::default(), ViewportSize::new(600.0, 600.0)).unwrap()
}

fn ten_pages() -> Viewer {
    viewer_for(Arc::new(FakeBackend::uniform(10, 600.0, 800.0)))
}

fn text_backend(lines: &[&[&str]]) -> Arc<FakeBackend> {
    let pages = lines
        .iter()
        .map(|page| FakePage::with_lines(600.0, 800.0, page))
        .collect();
    Arc::new(FakeBackend::new(Path::new("/tmp/text.pdf"), pages))
}

fn point((x, y): (f32, f32)) -> Point {
    Point::new(x, y)
}

fn notifications(viewer: &Viewer) -> Vec<String> {
    viewer
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            ViewerEvent::Notify(message) => Some(message),
            _ => None,
        })
        .collect()
}

fn press(viewer: &mut Viewer, button: MouseButton, at: Point, now: Instant) {
    viewer.handle_pointer(
        PointerEvent::Press {
            button,
            position: at,
            ctrl: false,
        },
        now,
    );
}

fn release(viewer: &mut Viewer, button: MouseButton, at: Point, now: Instant) {
    viewer.handle_pointer(PointerEvent::Release { button, position: at }, now);
}

fn move_to(viewer: &mut Viewer, at: Point, now: Instant) {
    viewer.handle_pointer(PointerEvent::Move { position: at }, now);
}

fn drag_select(viewer: &mut Viewer, from: Point, to: Point, now: Instant) {
    press(viewer, MouseButton::Primary, from, now);
    move_to(viewer, to, now);
    release(viewer, MouseButton::Primary, to, now);
}

#[test]
fn ten_page_document_draws_visible_pages_and_prunes_the_rest() {
    let mut viewer = ten_pages();
    assert_eq!(viewer.state().scale, 1.0);

    let frame = viewer.paint().unwrap();
    assert_eq!(viewer.state().start_page_index, 0);
    assert_eq!(viewer.state().last_page_index, 2);
    assert_eq!(frame.pages.len(), 2);
    assert_eq!(frame.pages[1].rect, Rect::new(0.0, 800.0, 600.0, 1600.0));
    assert_eq!(viewer.cache().pages(), vec![0, 1]);

    viewer.apply(Command::ScrollToEnd).unwrap();
    assert_eq!(viewer.state().scroll_offset, 7400.0);
    let frame = viewer.paint().unwrap();
    assert_eq!(viewer.state().start_page_index, 9);
    assert_eq!(viewer.state().last_page_index, 10);
    assert_eq!(viewer.state().current_page_index, 9);
    assert_eq!(frame.pages.len(), 1);
    assert_eq!(viewer.cache().pages(), vec![9]);
    assert_eq!(frame.progress.as_deref(), Some("93% ( 10/10 )"));
}

#[test]
fn current_page_samples_five_ninths_down_the_viewport() {
    let mut viewer = ten_pages();
    viewer.pan(0.0, 1000.0);
    assert_eq!(viewer.state().start_page_index, 1);
    assert_eq!(viewer.state().current_page_index, 1);

    viewer.pan(0.0, 250.0);
    // sample at 1250 + 333 = 1583, still page 1
    assert_eq!(viewer.state().current_page_index, 1);
    viewer.pan(0.0, 100.0);
    assert_eq!(viewer.state().current_page_index, 2);

    viewer.scroll_to_begin();
    assert_eq!(viewer.state().current_page_index, 0);
}

#[test]
fn zooming_keeps_the_anchor_and_empties_the_cache() {
    let mut viewer = ten_pages();
    viewer.pan(0.0, 1000.0);
    viewer.paint().unwrap();
    assert!(!viewer.cache().is_empty());

    viewer.scale_to(2.0);
    assert!(viewer.cache().is_empty());
    assert_eq!(viewer.state().scroll_offset, 2000.0);
    viewer.scale_to(1.0);
    assert!((viewer.state().scroll_offset - 1000.0).abs() < 1e-3);

    viewer.apply(Command::ZoomIn).unwrap();
    assert_eq!(viewer.state().read_mode, ReadMode::FitCustomize);
    assert!((viewer.state().scale - 1.2).abs() < 1e-5);
    viewer.apply(Command::ZoomOut).unwrap();
    viewer.apply(Command::ZoomOut).unwrap();
    assert_eq!(viewer.state().scale, 1.0);

    viewer.paint().unwrap();
    assert_eq!(viewer.cache().recorded_scale(), Some(1.0));
}

#[test]
fn fit_modes_follow_the_viewport() {
    let mut viewer = ten_pages();
    viewer.resize(ViewportSize::new(1200.0, 600.0));
    assert_eq!(viewer.state().scale, 2.0);

    viewer.apply(Command::ZoomReset { mode: ReadMode::FitHeight }).unwrap();
    assert_eq!(viewer.state().scale, 0.75);

    viewer.apply(Command::ToggleReadMode).unwrap();
    assert_eq!(viewer.state().read_mode, ReadMode::FitWidth);
    assert_eq!(viewer.state().scale, 2.0);
}

#[test]
fn device_scale_multiplies_the_raster_scale() {
    let backend = Arc::new(FakeBackend::uniform(2, 600.0, 800.0));
    let mut viewer = Viewer::new(
        backend.clone(),
        config(),
        HostTheme::default(),
        ViewportSize::new(600.0, 600.0).with_device_scale(2.0),
    )
    .unwrap();
    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages[0].rect.width(), 600.0);
    assert_eq!(frame.pages[0].bitmap.width, 1200);
    assert_eq!(backend.renders.lock()[0].scale, 2.0);
}

#[tokio::test]
async fn empty_document_is_rejected() {
    let provider = FakeProvider::new(Vec::new());
    let err = Viewer::open_with(
        &provider,
        Path::new("/tmp/empty.pdf"),
        config(),
        HostTheme::default(),
        ViewportSize::new(600.0, 600.0),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.downcast_ref::<ViewerError>(), Some(&ViewerError::EmptyDocument));
}

#[test]
fn search_steps_through_matches_and_wraps() {
    let backend = text_backend(&[&["hello world"], &["nothing"], &["world hello world"]]);
    let mut viewer = viewer_for(backend);
    viewer.apply(Command::Search).unwrap();
    assert_eq!(viewer.mode(), InteractionMode::Searching);
    assert!(viewer.drain_events().iter().any(|event| matches!(
        event,
        ViewerEvent::PromptInput {
            tag: PromptTag::SearchText,
            ..
        }
    )));

    viewer.handle_input_response(PromptTag::SearchText, "world");
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    let search = viewer.search_state().unwrap();
    assert_eq!(search.len(), 3);
    assert_eq!(search.pages(), vec![0, 2]);
    assert_eq!(notifications(&viewer), vec!["1/3".to_string()]);

    viewer.apply(Command::SearchNext).unwrap();
    // second match is on page 2, far below the viewport
    assert_eq!(viewer.state().current_page_index, 2);
    viewer.apply(Command::SearchNext).unwrap();
    viewer.apply(Command::SearchNext).unwrap();
    assert_eq!(notifications(&viewer), vec!["2/3", "3/3", "1/3"]);
    assert_eq!(viewer.search_state().unwrap().current_index(), 0);

    viewer.apply(Command::SearchPrevious).unwrap();
    assert_eq!(viewer.search_state().unwrap().current_index(), 2);

    viewer.apply(Command::CleanupSearch).unwrap();
    assert!(viewer.search_state().is_none());
}

#[test]
fn search_without_hits_reports_the_term() {
    let mut viewer = viewer_for(text_backend(&[&["hello"]]));
    viewer.apply(Command::Search).unwrap();
    viewer.handle_input_response(PromptTag::SearchText, "zzz");
    assert!(viewer.search_state().is_none());
    assert_eq!(notifications(&viewer), vec!["No results found with \"zzz\"."]);
}

#[test]
fn resubmitting_the_same_term_restarts_from_the_current_page() {
    let backend = text_backend(&[&["hello"], &["empty"], &["hello"], &["empty"], &["hello"]]);
    let mut viewer = viewer_for(backend);
    viewer.apply(Command::Search).unwrap();
    viewer.handle_input_response(PromptTag::SearchText, "hello");
    assert_eq!(viewer.search_state().unwrap().current_index(), 0);
    viewer.drain_events();

    viewer.jump_to_page(4);
    assert_eq!(viewer.state().current_page_index, 3);
    viewer.apply(Command::Search).unwrap();
    viewer.handle_input_response(PromptTag::SearchText, "hello");

    let search = viewer.search_state().unwrap();
    assert_eq!(search.current_index(), 2);
    assert_eq!(search.current().page_index, 4);
    assert_eq!(viewer.state().current_page_index, 4);
    assert_eq!(notifications(&viewer), vec!["3/3".to_string()]);
}

#[test]
fn search_as_you_type_waits_for_the_debounce() {
    let mut viewer = viewer_for(text_backend(&[&["hello"], &["hello"]]));
    let now = Instant::now();
    viewer.apply(Command::Search).unwrap();
    viewer.handle_input_changed(PromptTag::SearchText, "hel", now);
    assert!(!viewer.tick(now).redraw);
    assert!(viewer.search_state().is_none());

    let outcome = viewer.tick(now + Duration::from_secs(2));
    assert!(outcome.redraw);
    assert_eq!(viewer.search_state().unwrap().len(), 2);
    assert_eq!(viewer.mode(), InteractionMode::Searching);

    viewer.handle_input_cancelled(PromptTag::SearchText);
    assert!(viewer.search_state().is_none());
    assert_eq!(viewer.mode(), InteractionMode::Idle);
}

#[test]
fn search_highlights_are_painted_into_the_page() {
    let mut viewer = viewer_for(text_backend(&[&["hello"]]));
    viewer.search_text("hello");
    let frame = viewer.paint().unwrap();
    let (x, y) = glyph_center(0, 1);
    let pixel = frame.pages[0].bitmap.pixel(x as u32, y as u32).unwrap();
    assert_ne!(pixel, [255, 255, 255, 255]);
    let blank = frame.pages[0].bitmap.pixel(400, 400).unwrap();
    assert_eq!(blank, [255, 255, 255, 255]);
}

#[test]
fn drag_selection_copies_text() {
    let mut viewer = viewer_for(text_backend(&[&["Hi there", "second"]]));
    viewer.paint().unwrap();
    let now = Instant::now();
    drag_select(
        &mut viewer,
        point(glyph_center(0, 0)),
        point(glyph_center(0, 7)),
        now,
    );
    assert_eq!(viewer.mode(), InteractionMode::Selecting);
    assert!(viewer.selection().is_active());

    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages[0].selection.len(), 1);

    viewer.drain_events();
    viewer.apply(Command::CopySelection).unwrap();
    let events = viewer.drain_events();
    assert!(events.contains(&ViewerEvent::CopyToClipboard("Hi there".to_string())));
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    assert!(!viewer.selection().is_active());
}

#[test]
fn selection_across_lines_joins_with_blank_line() {
    let mut viewer = viewer_for(text_backend(&[&["ab", "cd"]]));
    viewer.paint().unwrap();
    drag_select(
        &mut viewer,
        point(glyph_center(0, 0)),
        point(glyph_center(1, 1)),
        Instant::now(),
    );
    assert_eq!(viewer.selected_text().as_deref(), Some("ab\n\ncd"));
}

#[test]
fn entering_another_mode_clears_the_selection() {
    let mut viewer = viewer_for(text_backend(&[&["Hi there"]]));
    viewer.paint().unwrap();
    drag_select(
        &mut viewer,
        point(glyph_center(0, 0)),
        point(glyph_center(0, 3)),
        Instant::now(),
    );
    viewer.apply(Command::JumpToLink).unwrap();
    assert_eq!(viewer.mode(), InteractionMode::JumpLinking);
    assert!(!viewer.selection().is_active());
}

#[test]
fn marked_links_are_underlined_until_toggled_off() {
    let mut viewer = viewer_for(linked_backend());
    let white = [255, 255, 255, 255];
    assert_eq!(viewer.paint().unwrap().pages[0].bitmap.pixel(150, 119), Some(white));

    viewer.apply(Command::ToggleMarkLink).unwrap();
    assert!(viewer.is_marking_links());
    assert!(viewer.cache().is_empty());
    let pixel = viewer.paint().unwrap().pages[0].bitmap.pixel(150, 119).unwrap();
    assert_ne!(pixel, white);

    viewer.apply(Command::ToggleMarkLink).unwrap();
    assert!(!viewer.is_marking_links());
    assert_eq!(viewer.paint().unwrap().pages[0].bitmap.pixel(150, 119), Some(white));
}

fn linked_backend() -> Arc<FakeBackend> {
    let first = FakePage::blank(600.0, 800.0)
        .with_link(Link {
            rect: Rect::new(100.0, 100.0, 200.0, 120.0),
            action: LinkAction::GoTo { page: 5 },
        })
        .with_link(Link {
            rect: Rect::new(100.0, 200.0, 200.0, 220.0),
            action: LinkAction::GoTo { page: 2 },
        })
        .with_link(Link {
            rect: Rect::new(100.0, 300.0, 200.0, 320.0),
            action: LinkAction::Uri {
                uri: "https://example.com".to_string(),
            },
        });
    let mut pages = vec![first];
    pages.extend((0..9).map(|_| FakePage::blank(600.0, 800.0)));
    Arc::new(FakeBackend::new(Path::new("/tmp/links.pdf"), pages))
}

fn label_at(frame: &Frame, y: f32) -> String {
    frame.pages[0]
        .labels
        .iter()
        .find(|placed| placed.rect.y0 == y)
        .map(|placed| placed.label.clone())
        .unwrap()
}

#[test]
fn jump_labels_resolve_to_link_targets() {
    let mut viewer = viewer_for(linked_backend());
    viewer.apply(Command::JumpToLink).unwrap();
    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages[0].labels.len(), 3);
    assert!(frame.pages[0].labels.iter().all(|placed| placed.label.len() == 1));

    let label = label_at(&frame, 100.0);
    viewer.drain_events();
    viewer.handle_input_response(PromptTag::JumpToLink, &label.to_lowercase());
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    assert_eq!(viewer.state().current_page_index, 5);
    assert_eq!(notifications(&viewer), vec!["Landed on Page 6"]);

    let frame = viewer.paint().unwrap();
    assert!(frame.pages.iter().all(|page| page.labels.is_empty()));
}

#[test]
fn jump_label_for_uri_asks_host_to_open_it() {
    let mut viewer = viewer_for(linked_backend());
    viewer.apply(Command::JumpToLink).unwrap();
    let frame = viewer.paint().unwrap();
    let label = label_at(&frame, 300.0);
    viewer.drain_events();
    viewer.handle_input_response(PromptTag::JumpToLink, &label);
    assert_eq!(
        viewer.drain_events(),
        vec![ViewerEvent::OpenUrl {
            url: "https://example.com".to_string(),
            external: false,
        }]
    );
}

#[test]
fn unknown_jump_label_is_reported() {
    let mut viewer = viewer_for(linked_backend());
    viewer.apply(Command::JumpToLink).unwrap();
    viewer.paint().unwrap();
    viewer.drain_events();
    viewer.handle_input_response(PromptTag::JumpToLink, "QQ");
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    assert_eq!(notifications(&viewer), vec!["no link is labelled \"QQ\""]);
}

#[test]
fn hovering_a_link_shows_its_target_and_click_follows_it() {
    let mut viewer = viewer_for(linked_backend());
    viewer.paint().unwrap();
    viewer.drain_events();
    let now = Instant::now();
    move_to(&mut viewer, Point::new(150.0, 210.0), now);
    assert_eq!(
        viewer.drain_events(),
        vec![ViewerEvent::Tooltip(Some("Link to page: 3".to_string()))]
    );

    press(&mut viewer, MouseButton::Primary, Point::new(150.0, 210.0), now);
    assert_eq!(viewer.state().current_page_index, 2);
    viewer.apply(Command::JumpToSavedPosition).unwrap();
    assert_eq!(viewer.state().scroll_offset, 0.0);
}

#[test]
fn hover_is_suppressed_right_after_a_wheel_scroll() {
    let mut viewer = viewer_for(linked_backend());
    viewer.paint().unwrap();
    let now = Instant::now();
    viewer.handle_pointer(
        PointerEvent::Wheel {
            delta_x: 0.0,
            delta_y: 0.0,
        },
        now,
    );
    move_to(&mut viewer, Point::new(150.0, 110.0), now + Duration::from_millis(100));
    assert!(viewer.hovered_link().is_none());
    move_to(&mut viewer, Point::new(150.0, 110.0), now + Duration::from_millis(600));
    assert!(viewer.hovered_link().is_some());
}

#[test]
fn wheel_scrolls_by_the_scroll_ratio() {
    let mut viewer = ten_pages();
    let now = Instant::now();
    viewer.handle_pointer(
        PointerEvent::Wheel {
            delta_x: 0.0,
            delta_y: -2.0,
        },
        now,
    );
    assert_eq!(viewer.state().scroll_offset, 60.0);
    viewer.handle_pointer(
        PointerEvent::Wheel {
            delta_x: 0.0,
            delta_y: 5.0,
        },
        now,
    );
    assert_eq!(viewer.state().scroll_offset, 0.0);
}

#[test]
fn popup_note_is_captured_after_the_settle_delay() {
    let backend = Arc::new(FakeBackend::uniform(3, 600.0, 800.0));
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    let now = Instant::now();

    viewer.apply(Command::AddPopupTextAnnot).unwrap();
    assert_eq!(viewer.mode(), InteractionMode::AnnotatingPopup(CaptureStage::Armed));
    press(&mut viewer, MouseButton::Primary, Point::new(100.0, 100.0), now);
    release(&mut viewer, MouseButton::Primary, Point::new(100.0, 100.0), now);
    assert_eq!(viewer.mode(), InteractionMode::AnnotatingPopup(CaptureStage::Settling));

    viewer.tick(now + Duration::from_millis(100));
    assert_eq!(viewer.mode(), InteractionMode::AnnotatingPopup(CaptureStage::Settling));
    viewer.drain_events();

    viewer.tick(now + Duration::from_millis(400));
    assert_eq!(
        viewer.mode(),
        InteractionMode::AnnotatingPopup(CaptureStage::AwaitingInput {
            page_index: 0,
            point: Point::new(100.0, 100.0),
        })
    );
    assert!(viewer.drain_events().iter().any(|event| matches!(
        event,
        ViewerEvent::PromptInput {
            tag: PromptTag::PopupTextAnnot,
            ..
        }
    )));

    viewer.handle_input_response(PromptTag::PopupTextAnnot, "note");
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    let annotations = backend.annotations_on(0);
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::Text);
    assert_eq!(annotations[0].content, "note");
    assert_eq!(annotations[0].rect, Rect::new(100.0, 100.0, 120.0, 120.0));
    assert_eq!(viewer.undo_log().len(), 1);
    assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
}

#[test]
fn inline_text_uses_the_computed_rect() {
    let backend = Arc::new(FakeBackend::uniform(1, 600.0, 800.0));
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    let now = Instant::now();
    viewer.apply(Command::AddInlineTextAnnot).unwrap();
    release(&mut viewer, MouseButton::Primary, Point::new(40.0, 60.0), now);
    viewer.tick(now + Duration::from_secs(1));
    viewer.handle_input_response(PromptTag::InlineTextAnnot, "abc\nabcdef");

    let annotations = backend.annotations_on(0);
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::FreeText);
    assert!((annotations[0].rect.width() - 60.0).abs() < 1e-3);
    assert!((annotations[0].rect.height() - 39.0).abs() < 1e-3);
}

#[test]
fn capture_is_dropped_when_the_mode_changes_before_it_fires() {
    let backend = Arc::new(FakeBackend::uniform(1, 600.0, 800.0));
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    let now = Instant::now();
    viewer.apply(Command::AddPopupTextAnnot).unwrap();
    release(&mut viewer, MouseButton::Primary, Point::new(100.0, 100.0), now);
    viewer.apply(Command::CancelMode).unwrap();
    viewer.drain_events();

    viewer.tick(now + Duration::from_secs(1));
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    assert!(viewer.drain_events().is_empty());
    assert!(backend.annotations_on(0).is_empty());
}

#[test]
fn secondary_press_disables_annotation_mode() {
    let mut viewer = viewer_for(Arc::new(FakeBackend::uniform(1, 600.0, 800.0)));
    viewer.paint().unwrap();
    viewer.apply(Command::AddInlineTextAnnot).unwrap();
    press(&mut viewer, MouseButton::Secondary, Point::new(10.0, 10.0), Instant::now());
    assert_eq!(viewer.mode(), InteractionMode::Idle);
}

#[test]
fn highlight_from_selection_can_be_undone_and_redone() {
    let backend = text_backend(&[&["Hi there"], &["other"]]);
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    drag_select(
        &mut viewer,
        point(glyph_center(0, 0)),
        point(glyph_center(0, 7)),
        Instant::now(),
    );
    viewer
        .apply(Command::AnnotateSelection {
            kind: AnnotationKind::Highlight,
        })
        .unwrap();
    let added = backend.annotations_on(0);
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].kind, AnnotationKind::Highlight);
    assert_eq!(added[0].quads.len(), 1);
    assert!(!viewer.selection().is_active());
    viewer.drain_events();

    viewer.apply(Command::Undo).unwrap();
    assert!(backend.annotations_on(0).is_empty());
    viewer.apply(Command::Undo).unwrap();
    viewer.apply(Command::Redo).unwrap();
    let restored = backend.annotations_on(0);
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, added[0].id);
    viewer.apply(Command::Redo).unwrap();
    assert_eq!(
        notifications(&viewer),
        vec![
            "Undo last action!",
            "No further undo action!",
            "Redo last action!",
            "No further redo action!",
        ]
    );
}

fn highlight_first_line(backend: &Arc<FakeBackend>) -> Viewer {
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    drag_select(
        &mut viewer,
        point(glyph_center(0, 0)),
        point(glyph_center(0, 7)),
        Instant::now(),
    );
    viewer
        .apply(Command::AnnotateSelection {
            kind: AnnotationKind::Highlight,
        })
        .unwrap();
    assert_eq!(backend.annotations_on(0).len(), 1);
    viewer.drain_events();
    viewer
}

#[test]
fn undo_redo_follows_ids_handed_out_on_recreation() {
    let backend = text_backend(&[&["Hi there"]]);
    backend.fresh_ids.store(true, Ordering::SeqCst);
    let mut viewer = highlight_first_line(&backend);
    let first = backend.annotations_on(0)[0].id.clone();

    viewer.apply(Command::Undo).unwrap();
    assert!(backend.annotations_on(0).is_empty());
    viewer.apply(Command::Redo).unwrap();
    let recreated = backend.annotations_on(0);
    assert_eq!(recreated.len(), 1);
    assert_ne!(recreated[0].id, first);
    assert_eq!(viewer.undo_log().actions()[0].annotation.id, recreated[0].id);

    viewer.apply(Command::Undo).unwrap();
    assert!(backend.annotations_on(0).is_empty());
}

#[test]
fn failed_undo_keeps_the_log_cursor() {
    let backend = text_backend(&[&["Hi there"]]);
    let mut viewer = highlight_first_line(&backend);
    assert_eq!(viewer.undo_log().cursor(), 0);

    backend.fail_annotation_writes.store(true, Ordering::SeqCst);
    viewer.apply(Command::Undo).unwrap();
    assert_eq!(backend.annotations_on(0).len(), 1);
    assert_eq!(viewer.undo_log().cursor(), 0);
    assert!(notifications(&viewer)
        .iter()
        .any(|message| message.starts_with("Failed to undo")));

    backend.fail_annotation_writes.store(false, Ordering::SeqCst);
    viewer.apply(Command::Redo).unwrap();
    assert_eq!(backend.annotations_on(0).len(), 1);
    viewer.apply(Command::Undo).unwrap();
    assert!(backend.annotations_on(0).is_empty());
    assert_eq!(viewer.undo_log().cursor(), -1);
}

#[test]
fn failed_redo_keeps_the_log_cursor() {
    let backend = text_backend(&[&["Hi there"]]);
    let mut viewer = highlight_first_line(&backend);
    viewer.apply(Command::Undo).unwrap();
    assert_eq!(viewer.undo_log().cursor(), -1);

    backend.fail_annotation_writes.store(true, Ordering::SeqCst);
    viewer.apply(Command::Redo).unwrap();
    assert!(backend.annotations_on(0).is_empty());
    assert_eq!(viewer.undo_log().cursor(), -1);

    backend.fail_annotation_writes.store(false, Ordering::SeqCst);
    viewer.apply(Command::Redo).unwrap();
    assert_eq!(backend.annotations_on(0).len(), 1);
    assert_eq!(viewer.undo_log().cursor(), 0);
}

fn text_note(id: &str, rect: Rect) -> Annotation {
    Annotation {
        id: id.to_string(),
        kind: AnnotationKind::Text,
        rect,
        quads: vec![Quad::from_rect(rect)],
        colors: AnnotationColors::default(),
        title: "someone".to_string(),
        content: "remember this".to_string(),
    }
}

#[test]
fn hovered_annotation_can_be_deleted_and_restored() {
    let backend = Arc::new(FakeBackend::uniform(2, 600.0, 800.0));
    backend.insert_annotation(0, text_note("note-1", Rect::new(200.0, 200.0, 220.0, 220.0)));
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    viewer.drain_events();

    move_to(&mut viewer, Point::new(210.0, 210.0), Instant::now());
    assert_eq!(
        viewer.hovered_annotation().map(|target| target.annotation.id.as_str()),
        Some("note-1")
    );
    assert!(viewer
        .drain_events()
        .contains(&ViewerEvent::Tooltip(Some("remember this".to_string()))));

    viewer.apply(Command::DeleteHoveredAnnot).unwrap();
    assert!(backend.annotations_on(0).is_empty());
    viewer.apply(Command::Undo).unwrap();
    let restored = backend.annotations_on(0);
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, "note-1");
}

#[test]
fn hovered_note_can_be_edited_and_moved() {
    let backend = Arc::new(FakeBackend::uniform(1, 600.0, 800.0));
    backend.insert_annotation(0, text_note("note-1", Rect::new(200.0, 200.0, 220.0, 220.0)));
    let mut viewer = viewer_for(backend.clone());
    viewer.paint().unwrap();
    let now = Instant::now();

    move_to(&mut viewer, Point::new(210.0, 210.0), now);
    viewer.apply(Command::EditHoveredAnnot).unwrap();
    viewer.handle_input_response(PromptTag::EditAnnotText, "changed");
    assert_eq!(backend.annotations_on(0)[0].content, "changed");

    move_to(&mut viewer, Point::new(210.0, 210.0), now);
    viewer.apply(Command::MoveHoveredAnnot).unwrap();
    move_to(&mut viewer, Point::new(300.0, 400.0), now);
    release(&mut viewer, MouseButton::Primary, Point::new(300.0, 400.0), now);
    viewer.tick(now + Duration::from_secs(1));
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    assert_eq!(
        backend.annotations_on(0)[0].rect,
        Rect::new(300.0, 400.0, 320.0, 420.0)
    );
}

#[test]
fn annotation_commands_are_refused_for_non_pdf_documents() {
    let backend = Arc::new(FakeBackend::uniform(1, 600.0, 800.0).not_pdf());
    let mut viewer = viewer_for(backend);
    viewer.apply(Command::AddPopupTextAnnot).unwrap();
    assert_eq!(viewer.mode(), InteractionMode::Idle);
    viewer.apply(Command::RotateClockwise).unwrap();
    assert_eq!(viewer.state().rotation, Rotation::Deg0);
    assert_eq!(
        notifications(&viewer),
        vec![
            "Annotation editing is not supported for this document.",
            "Only support PDF!",
        ]
    );
}

#[tokio::test]
async fn file_change_reloads_after_the_quiet_period() {
    let provider = FakeProvider::uniform(3, 600.0, 800.0);
    let mut viewer = Viewer::open_with(
        &provider,
        Path::new("/tmp/doc.pdf"),
        config(),
        HostTheme::default(),
        ViewportSize::new(600.0, 600.0),
    )
    .await
    .unwrap();
    viewer.paint().unwrap();
    viewer.drain_events();

    let now = Instant::now();
    viewer.notify_file_changed(now);
    assert_eq!(
        notifications(&viewer),
        vec!["Detected that /tmp/doc.pdf has been changed. Refreshing buffer..."]
    );
    assert!(!viewer.tick(now).reload_due);
    assert!(viewer.tick(now + Duration::from_millis(600)).reload_due);

    provider.fail_next.store(true, Ordering::SeqCst);
    assert!(!viewer.reload(&provider, now).await);
    assert_eq!(notifications(&viewer), vec!["Failed to reload PDF file!"]);
    assert!(viewer.next_deadline().is_some());

    provider.fail_next.store(false, Ordering::SeqCst);
    *provider.pages.lock() = (0..5).map(|_| FakePage::blank(600.0, 800.0)).collect();
    assert!(viewer.reload(&provider, now).await);
    assert!(viewer.has_pending_document());
    assert_eq!(viewer.page_count(), 3);

    viewer.paint().unwrap();
    assert_eq!(viewer.page_count(), 5);
    assert!(viewer.drain_events().contains(&ViewerEvent::DocumentReloaded));
}

#[tokio::test]
async fn reload_without_page_sizes_keeps_the_current_document() {
    let provider = FakeProvider::uniform(3, 600.0, 800.0);
    let mut viewer = Viewer::open_with(
        &provider,
        Path::new("/tmp/doc.pdf"),
        config(),
        HostTheme::default(),
        ViewportSize::new(600.0, 600.0),
    )
    .await
    .unwrap();
    viewer.apply(Command::JumpToPage { page: 2 }).unwrap();
    viewer.paint().unwrap();
    viewer.drain_events();

    *provider.pages.lock() = (0..5).map(|_| FakePage::blank(600.0, 800.0)).collect();
    provider.broken_page_sizes.store(true, Ordering::SeqCst);
    let now = Instant::now();
    assert!(viewer.reload(&provider, now).await);

    let frame = viewer.paint().unwrap();
    assert_eq!(viewer.page_count(), 3);
    assert_eq!(viewer.state().current_page_index, 1);
    assert!(!frame.pages.is_empty());
    let events = viewer.drain_events();
    assert!(!events.contains(&ViewerEvent::DocumentReloaded));
    assert!(events.contains(&ViewerEvent::Notify("Failed to reload PDF file!".to_string())));

    assert!(!viewer.tick(now).reload_due);
    assert!(viewer.tick(now + RELOAD_DELAY).reload_due);

    provider.broken_page_sizes.store(false, Ordering::SeqCst);
    assert!(viewer.reload(&provider, now).await);
    viewer.paint().unwrap();
    assert_eq!(viewer.page_count(), 5);
    assert!(viewer.drain_events().contains(&ViewerEvent::DocumentReloaded));
}

#[test]
fn presentation_mode_shows_one_page_and_restores_on_exit() {
    let mut viewer = ten_pages();
    viewer.apply(Command::JumpToPage { page: 4 }).unwrap();
    assert_eq!(viewer.state().current_page_index, 3);
    viewer.drain_events();

    viewer.apply(Command::TogglePresentationMode).unwrap();
    assert_eq!(viewer.drain_events(), vec![ViewerEvent::EnterFullscreen]);
    assert_eq!(viewer.state().read_mode, ReadMode::Presentation);
    assert_eq!(viewer.state().scale, 0.75);
    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages.len(), 1);
    assert_eq!(frame.pages[0].page_index, 3);
    assert_eq!(frame.pages[0].rect, Rect::new(75.0, 0.0, 525.0, 600.0));

    viewer.apply(Command::ScrollDown).unwrap();
    assert_eq!(viewer.state().current_page_index, 4);
    viewer.drain_events();

    viewer.apply(Command::TogglePresentationMode).unwrap();
    assert!(viewer.drain_events().contains(&ViewerEvent::ExitFullscreen));
    assert_eq!(viewer.state().read_mode, ReadMode::FitWidth);
    assert_eq!(viewer.state().scale, 1.0);
    assert_eq!(viewer.state().scroll_offset, 3200.0);
}

#[test]
fn saved_positions_swap_back_and_forth() {
    let mut viewer = ten_pages();
    viewer.apply(Command::JumpToSavedPosition).unwrap();
    assert_eq!(notifications(&viewer), vec!["Cannot jump from this position."]);

    viewer.pan(0.0, 1000.0);
    viewer.apply(Command::SaveCurrentPosition).unwrap();
    viewer.pan(0.0, 2000.0);
    viewer.apply(Command::JumpToSavedPosition).unwrap();
    assert_eq!(viewer.state().scroll_offset, 1000.0);
    viewer.apply(Command::JumpToSavedPosition).unwrap();
    assert_eq!(viewer.state().scroll_offset, 3000.0);
    assert_eq!(notifications(&viewer), vec!["Saved current position."]);
}

#[test]
fn rotation_swaps_the_page_axes_and_keeps_the_page() {
    let mut viewer = ten_pages();
    viewer.apply(Command::JumpToPage { page: 3 }).unwrap();
    viewer.apply(Command::RotateClockwise).unwrap();
    assert_eq!(viewer.state().rotation, Rotation::Deg90);
    assert_eq!(viewer.page_size(), PageSize::new(800.0, 600.0));
    assert_eq!(viewer.state().scale, 0.75);
    assert_eq!(viewer.state().current_page_index, 2);

    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages[0].bitmap.width, 600);
    assert_eq!(frame.pages[0].bitmap.height, 450);
}

#[test]
fn trimming_uses_the_text_bounds_as_the_page() {
    let backend = text_backend(&[&["abc"], &["abc"]]);
    let mut viewer = viewer_for(backend.clone());
    viewer.apply(Command::ToggleTrimWhiteMargin).unwrap();
    assert_eq!(viewer.page_size(), PageSize::new(18.0, 12.0));
    assert_eq!(viewer.state().scale, 600.0 / 18.0);

    viewer.paint().unwrap();
    let request = backend.renders.lock()[0];
    assert_eq!(request.clip, Some(Rect::new(50.0, 50.0, 68.0, 62.0)));

    viewer.apply(Command::ToggleTrimWhiteMargin).unwrap();
    assert_eq!(viewer.page_size(), PageSize::new(600.0, 800.0));
}

#[test]
fn forced_dark_mode_inverts_everything_but_images() {
    let backend = Arc::new(FakeBackend::new(
        Path::new("/tmp/dark.pdf"),
        vec![FakePage::blank(600.0, 800.0).with_image(Rect::new(0.0, 0.0, 100.0, 100.0))],
    ));
    let mut viewer = Viewer::new(
        backend,
        ViewerConfig {
            dark_mode: DarkModePolicy::Force,
            ..config()
        },
        HostTheme::default(),
        ViewportSize::new(600.0, 600.0),
    )
    .unwrap();
    assert!(viewer.is_inverted());
    assert_eq!(viewer.background_color(), Color::rgb(0x24, 0x24, 0x24));

    let frame = viewer.paint().unwrap();
    let bitmap = &frame.pages[0].bitmap;
    assert_eq!(bitmap.pixel(10, 10), Some([255, 255, 255, 255]));
    assert_eq!(bitmap.pixel(300, 300), Some([0, 0, 0, 255]));

    viewer.apply(Command::ToggleInvertedMode).unwrap();
    assert!(viewer.cache().is_empty());
    let frame = viewer.paint().unwrap();
    assert_eq!(frame.pages[0].bitmap.pixel(300, 300), Some([255, 255, 255, 255]));
}

#[test]
fn follow_policy_tracks_the_host_theme() {
    let mut viewer = ten_pages();
    assert!(!viewer.is_inverted());
    viewer.set_theme(HostTheme {
        mode: ThemeMode::Dark,
        background: Color::BLACK,
        foreground: Color::WHITE,
    });
    assert!(viewer.is_inverted());
    assert_eq!(viewer.background_color(), Color::BLACK);
}

#[test]
fn synctex_marker_is_shown_then_cleared() {
    let mut viewer = ten_pages();
    let now = Instant::now();
    let info: SynctexInfo = "synctex_info=3:100:400".parse().unwrap();
    viewer.jump_to_synctex(info, now).unwrap();
    assert_eq!(viewer.state().current_page_index, 2);

    let frame = viewer.paint().unwrap();
    let marker = frame.synctex_marker.unwrap();
    assert_eq!(marker.width(), 12.0);

    assert!(viewer.tick(now + Duration::from_secs(6)).redraw);
    assert!(viewer.synctex_target().is_none());
    assert!(viewer.paint().unwrap().synctex_marker.is_none());

    let beyond: SynctexInfo = "99:1:1".parse().unwrap();
    assert!(viewer.jump_to_synctex(beyond, now).is_err());
}

#[test]
fn launch_target_outside_the_document_is_reported() {
    let mut viewer = ten_pages();
    viewer.drain_events();
    let beyond: SynctexInfo = "99:1:1".parse().unwrap();
    viewer.jump_to_launch_target(Some(3), Some(beyond), Instant::now());
    assert_eq!(viewer.state().current_page_index, 2);
    assert!(viewer.synctex_target().is_none());
    assert_eq!(
        notifications(&viewer),
        vec!["Cannot jump to synctex target: page 98 out of range (document has 10 pages)"]
    );

    let inside: SynctexInfo = "5:10:20".parse().unwrap();
    viewer.jump_to_launch_target(None, Some(inside), Instant::now());
    assert_eq!(viewer.synctex_target(), Some(inside));
}

#[test]
fn double_clicks_request_translation_and_backward_search() {
    let mut viewer = viewer_for(text_backend(&[&["Hi there"]]));
    viewer.paint().unwrap();
    viewer.drain_events();
    let now = Instant::now();
    let at = point(glyph_center(0, 1));

    viewer.handle_pointer(
        PointerEvent::DoubleClick {
            button: MouseButton::Secondary,
            position: at,
        },
        now,
    );
    viewer.handle_pointer(
        PointerEvent::DoubleClick {
            button: MouseButton::Primary,
            position: at,
        },
        now,
    );
    assert_eq!(
        viewer.drain_events(),
        vec![
            ViewerEvent::TranslateWord("Hi".to_string()),
            ViewerEvent::SynctexBackwardEdit {
                path: PathBuf::from("/tmp/text.pdf"),
                page: 1,
                x: at.x,
                y: at.y,
            },
        ]
    );
}

#[test]
fn session_round_trips_through_persisted_state() {
    let mut viewer = ten_pages();
    viewer.apply(Command::ZoomIn).unwrap();
    viewer.pan(0.0, 500.0);
    viewer.apply(Command::SaveCurrentPosition).unwrap();
    let persisted = viewer.persisted_state();
    assert_eq!(
        persisted.session.map(|session| session.read_mode),
        Some(ReadMode::FitCustomize)
    );

    let mut restored = ten_pages();
    restored.restore(&persisted).unwrap();
    assert!((restored.state().scale - 1.2).abs() < 1e-5);
    assert_eq!(restored.state().scroll_offset, 500.0);
    assert_eq!(restored.state().read_mode, ReadMode::FitCustomize);
    restored.apply(Command::JumpToSavedPosition).unwrap();
    assert_eq!(restored.state().scroll_offset, 500.0);
}

#[test]
fn presentation_session_reopens_on_the_presented_page() {
    let mut viewer = ten_pages();
    viewer.pan(0.0, 1000.0);
    viewer.apply(Command::TogglePresentationMode).unwrap();
    viewer.apply(Command::ScrollDown).unwrap();
    viewer.apply(Command::ScrollDown).unwrap();
    assert_eq!(viewer.state().current_page_index, 3);
    let session = viewer.session_data();
    assert_eq!(session.read_mode, ReadMode::Presentation);
    assert_eq!(session.start_page_index, Some(3));
    assert_eq!(session.scroll_offset, 1000.0);

    let mut restored = ten_pages();
    restored.restore_session(&session).unwrap();
    assert_eq!(restored.state().read_mode, ReadMode::Presentation);
    assert_eq!(restored.state().current_page_index, 3);
    assert_eq!(restored.paint().unwrap().pages[0].page_index, 3);

    restored.apply(Command::TogglePresentationMode).unwrap();
    assert_eq!(restored.state().read_mode, ReadMode::FitWidth);
    assert_eq!(restored.state().scroll_offset, 1000.0);
}

#[test]
fn position_changes_are_reported_once_per_page() {
    let mut viewer = ten_pages();
    viewer.paint().unwrap();
    viewer.paint().unwrap();
    let positions: Vec<_> = viewer
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, ViewerEvent::PositionChanged { .. }))
        .collect();
    assert_eq!(
        positions,
        vec![ViewerEvent::PositionChanged {
            current_page: 1,
            page_count: 10,
        }]
    );
}
