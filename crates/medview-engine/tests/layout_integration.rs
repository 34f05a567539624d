//! Integration tests for layout editing: validated mutations, drag with
//! snapping, persistence and the viewport remapping that follows a layout
//! change.

use std::sync::Arc;

use medview_core::{
    ElementId, LayoutConfiguration, LayoutElement, LayoutError, LayoutPreset, Monitor, MonitorId, QualityTier, Rect,
    SnapModes, SnapSettings,
};

use medview_engine::application::drag::{CancelReason, DragEngine, DragKind, DropOutcome, PointerId, PointerPosition};
use medview_engine::application::events::{EngineEvent, EventBus};
use medview_engine::application::layout_manager::LayoutManager;
use medview_engine::application::session::{SessionSettings, ViewerSession};
use medview_engine::infrastructure::image_source::MockImageSource;
use medview_engine::infrastructure::storage::layout_store::FileLayoutStore;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn monitor() -> Monitor {
    Monitor::new(0, 0, 0, 1920, 1080).as_primary()
}

/// Three viewport slots in a row with gaps between them.
fn three_in_a_row() -> (LayoutConfiguration, [ElementId; 3]) {
    let rects = [
        Rect::new(0, 0, 400, 400),
        Rect::new(500, 0, 400, 400),
        Rect::new(1200, 0, 400, 400),
    ];
    let elements: Vec<LayoutElement> = rects
        .iter()
        .map(|r| LayoutElement::viewport_slot(MonitorId(0), *r).expect("valid slot"))
        .collect();
    let ids = [elements[0].id(), elements[1].id(), elements[2].id()];
    let layout = LayoutConfiguration::from_parts("row", vec![monitor()], elements).expect("valid layout");
    (layout, ids)
}

fn manager_with(layout: LayoutConfiguration, dir: &std::path::Path) -> (Arc<LayoutManager>, EventBus) {
    let events = EventBus::new();
    let manager = Arc::new(LayoutManager::new(
        layout,
        Arc::new(FileLayoutStore::new(dir)),
        events.clone(),
    ));
    (manager, events)
}

fn at(x: i32, y: i32) -> PointerPosition {
    PointerPosition::new(MonitorId(0), x, y)
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_move_drag_snaps_viewport_two_onto_viewport_three() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let (layout, [_, v2, v3]) = three_in_a_row();
    let (manager, events) = manager_with(layout, dir.path());
    let settings = SnapSettings {
        modes: SnapModes::GRID | SnapModes::ELEMENT_EDGE,
        ..SnapSettings::default()
    };
    let drag = DragEngine::new(Arc::clone(&manager), settings, events.clone());
    let (_, mut rx) = events.subscribe();
    let pointer = PointerId(7);

    // Act: 293 px right leaves viewport 2's right edge 8 px short of viewport 3
    drag.begin(pointer, v2, DragKind::Move, at(700, 200)).unwrap();
    drag.update(pointer, at(850, 210)).unwrap();
    drag.update(pointer, at(993, 200)).unwrap();
    let outcome = drag.end(pointer).await.unwrap();

    // Assert
    let DropOutcome::Committed(layout) = outcome else {
        panic!("drop must commit");
    };
    let (r2, r3) = (layout.element(v2).unwrap().rect(), layout.element(v3).unwrap().rect());
    assert_eq!(r2.right(), r3.x);
    assert_eq!(layout.version(), 1);

    let mut saw_preview = false;
    let mut committed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::DragPreview(_) => saw_preview = true,
            EngineEvent::DragCommitted { mutation, version, .. } => committed = Some((mutation, version)),
            _ => {}
        }
    }
    assert!(saw_preview);
    assert_eq!(committed, Some(("move", 1)));
}

#[tokio::test]
async fn test_cancelled_drag_leaves_layout_exactly_as_before() {
    let dir = tempfile::tempdir().unwrap();
    let (layout, [v1, _, _]) = three_in_a_row();
    let (manager, events) = manager_with(layout, dir.path());
    let drag = DragEngine::new(Arc::clone(&manager), SnapSettings::default(), events);
    let before = manager.current();

    drag.begin(PointerId(1), v1, DragKind::Move, at(10, 10)).unwrap();
    drag.update(PointerId(1), at(60, 300)).unwrap();
    drag.cancel(PointerId(1), CancelReason::Escape).unwrap();

    assert_eq!(*manager.current(), *before);
    assert_eq!(manager.current().version(), 0);
}

#[tokio::test]
async fn test_out_of_bounds_mutations_leave_layout_unchanged() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let (layout, [v1, _, _]) = three_in_a_row();
    let (manager, _) = manager_with(layout, dir.path());
    let before = manager.current();

    // Act
    let resized = manager.resize(v1, 2400, 400).await;
    let added = manager
        .add_element(LayoutElement::viewport_slot(MonitorId(0), Rect::new(1700, 900, 400, 400)).unwrap())
        .await;

    // Assert
    assert!(matches!(resized, Err(LayoutError::OutOfMonitorBounds { .. })));
    assert!(matches!(added, Err(LayoutError::OutOfMonitorBounds { .. })));
    assert_eq!(*manager.current(), *before);
}

#[tokio::test]
async fn test_saved_layout_restores_through_file_store() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let (layout, [v1, _, _]) = three_in_a_row();
    let (manager, _) = manager_with(layout, dir.path());
    manager.move_to(v1, 0, 500).await.unwrap();
    manager.save_as("reading/row").await.unwrap();
    let saved = manager.current();

    // Act
    manager.load_preset(LayoutPreset::Quad).await.unwrap();
    let restored = manager.restore("reading/row").await.unwrap();

    // Assert
    assert_eq!(restored.elements(), saved.elements());
    assert_eq!(restored.version(), 3);
    assert_eq!(manager.list("reading").await.unwrap(), vec!["row"]);
}

#[tokio::test]
async fn test_split_drag_in_session_adds_an_empty_viewport() {
    // Arrange
    let settings = SessionSettings {
        preset: LayoutPreset::Single,
        ..SessionSettings::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let session = ViewerSession::start(
        Arc::new(MockImageSource::new()),
        Arc::new(FileLayoutStore::new(dir.path())),
        settings,
    )
    .unwrap();
    let slot = session.layout().current().viewport_slots()[0].id;
    session
        .viewports()
        .bind(Some(slot), medview_core::ImageReference::new("S1", "0001", 0), QualityTier::Preview)
        .await
        .unwrap();

    // Act
    let drag = session.drag();
    drag.begin(PointerId(1), slot, DragKind::Split(medview_core::Axis::X), at(900, 500)).unwrap();
    drag.update(PointerId(1), at(960, 500)).unwrap();
    drag.end(PointerId(1)).await.unwrap();

    // Assert
    let ids = session.viewports().viewport_ids();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], slot);
    assert!(session.viewports().displayed(slot).is_some());
    assert!(session.viewports().displayed(ids[1]).is_none());
    assert_eq!(session.viewports().viewport(slot).unwrap().frame(), (960, 1080));
}
