//! DragEngine: interactive move / resize / swap / split / merge of layout
//! elements.
//!
//! # Life of a drag (for beginners)
//!
//! ```text
//! pointer-down ──► begin()   snapshot the authoritative layout, compute drop targets
//! pointer-move ──► update()  snap + clamp, validate on a scratch copy, publish DragPreview
//! pointer-up   ──► end()     apply the last valid candidate through the LayoutManager, once
//! escape       ──► cancel()  discard the scratch copy
//! ```
//!
//! The authoritative layout is never touched while a drag is in progress.
//! Every candidate geometry is first snapped (see
//! `medview_core::domain::snap`), then validated by applying the would-be
//! mutation to the drag's scratch copy.  A candidate the layout rules reject
//! is never offered; for move and resize the previous valid candidate stays
//! in place instead.  Cancelling therefore only has to forget the scratch
//! copy, which restores the pre-drag state exactly.
//!
//! One drag per pointer: starting a second drag on a busy pointer fails with
//! [`DragError::AlreadyActive`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use medview_core::domain::layout::mergeable;
use medview_core::domain::snap::{snap_move, snap_resize, snap_split};
use medview_core::{
    Axis, ElementId, ElementKind, LayoutConfiguration, LayoutElement, LayoutError, LayoutMutation, MonitorId, Point,
    Rect, ResizeHandle, SnapContext, SnapGuide, SnapSettings,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::events::{DragPreview, EngineEvent, EventBus};
use super::layout_manager::LayoutManager;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Identifies an input pointer (mouse, pen, touch contact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub u32);

impl fmt::Display for PointerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pointer-{}", self.0)
    }
}

/// A pointer position in the coordinates of the monitor it is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerPosition {
    pub monitor: MonitorId,
    pub point: Point,
}

impl PointerPosition {
    pub fn new(monitor: MonitorId, x: i32, y: i32) -> Self {
        Self {
            monitor,
            point: Point::new(x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Move,
    Resize(ResizeHandle),
    Swap,
    /// Divide the dragged viewport slot along the axis under the pointer.
    Split(Axis),
    Merge,
}

impl DragKind {
    pub fn name(self) -> &'static str {
        match self {
            DragKind::Move => "move",
            DragKind::Resize(_) => "resize",
            DragKind::Swap => "swap",
            DragKind::Split(_) => "split",
            DragKind::Merge => "merge",
        }
    }

    /// Move and resize produce free geometry; the others pick a target.
    fn is_geometric(self) -> bool {
        matches!(self, DragKind::Move | DragKind::Resize(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user pressed escape.
    Escape,
    /// The drag ended with no valid drop candidate.
    InvalidTarget,
    /// The pointer left every monitor.
    PointerLeftCanvas,
    /// The layout manager rejected the drop (the layout changed under the
    /// drag).
    Rejected,
}

/// An element the dragged element can be dropped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub element: ElementId,
    pub monitor: MonitorId,
    /// Area that activates the target, grown by the trigger radius.
    pub zone: Rect,
}

/// Result of a pointer move.
#[derive(Debug, Clone, PartialEq)]
pub enum DragUpdate {
    Preview(DragPreview),
    Cancelled(CancelReason),
}

/// Result of a pointer release.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Committed(Arc<LayoutConfiguration>),
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("{0} already has an active drag")]
    AlreadyActive(PointerId),

    #[error("{0} has no active drag")]
    NotActive(PointerId),

    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("{0} does not exist in the current layout")]
    MonitorNotFound(MonitorId),

    #[error("cannot {kind} element {element}")]
    Unsupported { element: ElementId, kind: &'static str },

    #[error("drop rejected: {0}")]
    Rejected(#[from] LayoutError),
}

// ── Internal drag state ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Candidate {
    mutation: LayoutMutation,
    guides: Vec<SnapGuide>,
}

struct DragOperation {
    element: ElementId,
    kind: DragKind,
    origin: Arc<LayoutConfiguration>,
    start: PointerPosition,
    pointer: PointerPosition,
    targets: Vec<DropTarget>,
    candidate: Option<Candidate>,
    /// Scratch copy: `origin` with the current candidate applied.
    preview: LayoutConfiguration,
    /// Id given to the new half of a split, stable across pointer moves.
    split_id: ElementId,
}

impl DragOperation {
    fn element_rect(&self) -> Option<Rect> {
        self.origin.element(self.element).map(|e| e.rect())
    }

    fn preview_rect(&self) -> Option<Rect> {
        self.candidate
            .as_ref()
            .and_then(|_| self.preview.element(self.element).map(|e| e.rect()))
    }
}

// ── DragEngine ────────────────────────────────────────────────────────────────

pub struct DragEngine {
    layout: Arc<LayoutManager>,
    events: EventBus,
    settings: RwLock<SnapSettings>,
    drags: Mutex<HashMap<PointerId, DragOperation>>,
}

impl DragEngine {
    pub fn new(layout: Arc<LayoutManager>, settings: SnapSettings, events: EventBus) -> Self {
        Self {
            layout,
            events,
            settings: RwLock::new(settings),
            drags: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> SnapSettings {
        *self.settings.read()
    }

    /// Replaces the snap settings; takes effect on the next pointer move.
    pub fn set_settings(&self, settings: SnapSettings) {
        *self.settings.write() = settings;
    }

    pub fn is_active(&self, pointer: PointerId) -> bool {
        self.drags.lock().contains_key(&pointer)
    }

    /// The scratch configuration of an active drag.
    pub fn preview(&self, pointer: PointerId) -> Option<LayoutConfiguration> {
        self.drags.lock().get(&pointer).map(|op| op.preview.clone())
    }

    /// Starts a drag of `element` and returns its drop targets.
    ///
    /// # Errors
    ///
    /// - [`DragError::AlreadyActive`] if `pointer` is already dragging.
    /// - [`DragError::Unsupported`] if the element cannot take part in
    ///   `kind` (a fixed panel, a split of a toolbar …).
    pub fn begin(
        &self,
        pointer: PointerId,
        element: ElementId,
        kind: DragKind,
        at: PointerPosition,
    ) -> Result<Vec<DropTarget>, DragError> {
        let mut drags = self.drags.lock();
        if drags.contains_key(&pointer) {
            debug!(%pointer, %element, "second drag on a busy pointer rejected");
            return Err(DragError::AlreadyActive(pointer));
        }

        let origin = self.layout.current();
        let dragged = origin.element(element).ok_or(DragError::ElementNotFound(element))?;
        if origin.monitor(at.monitor).is_none() {
            return Err(DragError::MonitorNotFound(at.monitor));
        }
        let allowed = match kind {
            DragKind::Move | DragKind::Swap => dragged.is_movable(),
            DragKind::Resize(_) => dragged.is_resizable(),
            DragKind::Split(_) | DragKind::Merge => dragged.kind() == ElementKind::ViewportSlot,
        };
        if !allowed {
            return Err(DragError::Unsupported {
                element,
                kind: kind.name(),
            });
        }

        let radius = self.settings.read().trigger_radius;
        let targets = drop_targets(&origin, element, kind, radius);
        debug!(%pointer, %element, kind = kind.name(), targets = targets.len(), "drag started");

        drags.insert(
            pointer,
            DragOperation {
                element,
                kind,
                preview: (*origin).clone(),
                origin,
                start: at,
                pointer: at,
                targets: targets.clone(),
                candidate: None,
                split_id: Uuid::new_v4(),
            },
        );
        Ok(targets)
    }

    /// Feeds a pointer move.  Publishes and returns the new preview, or
    /// cancels the drag when the pointer left the canvas.
    pub fn update(&self, pointer: PointerId, at: PointerPosition) -> Result<DragUpdate, DragError> {
        let settings = self.settings();
        let mut drags = self.drags.lock();
        let op = drags.get_mut(&pointer).ok_or(DragError::NotActive(pointer))?;

        let on_canvas = op
            .origin
            .monitor(at.monitor)
            .is_some_and(|m| m.bounds().contains_point(at.point));
        if !on_canvas {
            if let Some(op) = drags.remove(&pointer) {
                drop(drags);
                self.cancelled(pointer, &op, CancelReason::PointerLeftCanvas);
            }
            return Ok(DragUpdate::Cancelled(CancelReason::PointerLeftCanvas));
        }
        op.pointer = at;

        let highlighted = highlighted_targets(op, &settings);
        let proposal = propose(op, &highlighted, &settings);
        match proposal {
            Some(candidate) => match op.origin.apply(&candidate.mutation) {
                Ok(result) => {
                    op.preview = result.configuration;
                    op.candidate = Some(candidate);
                }
                Err(e) => {
                    trace!(%pointer, error = %e, "candidate geometry rejected");
                    if !op.kind.is_geometric() {
                        op.candidate = None;
                        op.preview = (*op.origin).clone();
                    }
                }
            },
            None => {
                op.candidate = None;
                op.preview = (*op.origin).clone();
            }
        }

        let preview = DragPreview {
            pointer,
            element: op.element,
            kind: op.kind,
            rect: op.preview_rect(),
            highlighted,
            guides: op.candidate.as_ref().map(|c| c.guides.clone()).unwrap_or_default(),
        };
        drop(drags);
        self.events.publish(EngineEvent::DragPreview(preview.clone()));
        Ok(DragUpdate::Preview(preview))
    }

    /// Ends the drag, applying the last valid candidate exactly once.
    ///
    /// # Errors
    ///
    /// [`DragError::Rejected`] if the layout changed under the drag and the
    /// candidate no longer validates; the authoritative layout is unchanged.
    pub async fn end(&self, pointer: PointerId) -> Result<DropOutcome, DragError> {
        let op = self
            .drags
            .lock()
            .remove(&pointer)
            .ok_or(DragError::NotActive(pointer))?;

        let Some(candidate) = op.candidate.clone() else {
            self.cancelled(pointer, &op, CancelReason::InvalidTarget);
            return Ok(DropOutcome::Cancelled(CancelReason::InvalidTarget));
        };

        let mutation = candidate.mutation.name();
        match self.layout.apply(candidate.mutation).await {
            Ok(layout) => {
                info!(%pointer, element = %op.element, mutation, version = layout.version(), "drag committed");
                self.events.publish(EngineEvent::DragCommitted {
                    pointer,
                    element: op.element,
                    mutation,
                    version: layout.version(),
                });
                Ok(DropOutcome::Committed(layout))
            }
            Err(e) => {
                self.cancelled(pointer, &op, CancelReason::Rejected);
                Err(DragError::Rejected(e))
            }
        }
    }

    /// Abandons the drag; the layout stays exactly as it was.
    pub fn cancel(&self, pointer: PointerId, reason: CancelReason) -> Result<(), DragError> {
        let op = self
            .drags
            .lock()
            .remove(&pointer)
            .ok_or(DragError::NotActive(pointer))?;
        self.cancelled(pointer, &op, reason);
        Ok(())
    }

    fn cancelled(&self, pointer: PointerId, op: &DragOperation, reason: CancelReason) {
        debug!(%pointer, element = %op.element, ?reason, "drag cancelled");
        self.events.publish(EngineEvent::DragCancelled {
            pointer,
            element: op.element,
            reason,
        });
    }
}

// ── Candidate computation ─────────────────────────────────────────────────────

fn drop_targets(layout: &LayoutConfiguration, element: ElementId, kind: DragKind, radius: u32) -> Vec<DropTarget> {
    let Some(dragged) = layout.element(element) else {
        return Vec::new();
    };
    let grow = |rect: Rect| {
        let r = radius as i32;
        Rect::from_edges(rect.x - r, rect.y - r, rect.right() + r, rect.bottom() + r)
    };
    let target = |e: &LayoutElement| DropTarget {
        element: e.id(),
        monitor: e.monitor(),
        zone: grow(e.rect()),
    };
    match kind {
        DragKind::Move | DragKind::Resize(_) => Vec::new(),
        DragKind::Split(_) => vec![target(dragged)],
        DragKind::Swap => layout
            .elements()
            .iter()
            .filter(|e| e.id() != element && e.kind() == dragged.kind() && e.is_movable())
            .map(target)
            .collect(),
        DragKind::Merge => layout
            .elements()
            .iter()
            .filter(|e| {
                e.id() != element
                    && e.kind() == ElementKind::ViewportSlot
                    && mergeable(dragged.placement(), e.placement())
            })
            .map(target)
            .collect(),
    }
}

/// Targets whose zone contains the pointer, nearest first.
fn highlighted_targets(op: &DragOperation, settings: &SnapSettings) -> Vec<ElementId> {
    let mut near: Vec<(f64, ElementId)> = op
        .targets
        .iter()
        .filter(|t| t.monitor == op.pointer.monitor)
        .filter_map(|t| {
            let rect = op.origin.element(t.element)?.rect();
            let distance = rect.distance_to_point(op.pointer.point);
            (distance <= f64::from(settings.trigger_radius)).then_some((distance, t.element))
        })
        .collect();
    near.sort_by(|a, b| a.0.total_cmp(&b.0));
    near.into_iter().map(|(_, id)| id).collect()
}

fn propose(op: &DragOperation, highlighted: &[ElementId], settings: &SnapSettings) -> Option<Candidate> {
    let original = op.element_rect()?;
    let dragged = op.origin.element(op.element)?;
    let same_monitor = op.pointer.monitor == dragged.monitor() && op.start.monitor == dragged.monitor();
    let (dx, dy) = (
        op.pointer.point.x - op.start.point.x,
        op.pointer.point.y - op.start.point.y,
    );

    match op.kind {
        DragKind::Move if op.pointer.monitor != dragged.monitor() => Some(Candidate {
            mutation: LayoutMutation::MoveToMonitor {
                id: op.element,
                monitor: op.pointer.monitor,
            },
            guides: Vec::new(),
        }),
        DragKind::Move => {
            if !same_monitor {
                return None;
            }
            let context = SnapContext::for_element(&op.origin, op.element)?;
            let snapped = snap_move(original.translate(dx, dy), &context, settings);
            Some(Candidate {
                mutation: LayoutMutation::MoveTo {
                    id: op.element,
                    x: snapped.rect.x,
                    y: snapped.rect.y,
                },
                guides: snapped.guides,
            })
        }
        DragKind::Resize(handle) => {
            if !same_monitor {
                return None;
            }
            let context = SnapContext::for_element(&op.origin, op.element)?;
            let snapped = snap_resize(original, handle, dx, dy, dragged.constraints(), &context, settings);
            Some(Candidate {
                mutation: LayoutMutation::SetRect {
                    id: op.element,
                    rect: snapped.rect,
                },
                guides: snapped.guides,
            })
        }
        DragKind::Split(axis) => {
            if !highlighted.contains(&op.element) {
                return None;
            }
            let offset = match axis {
                Axis::X => op.pointer.point.x - original.x,
                Axis::Y => op.pointer.point.y - original.y,
            };
            let at = snap_split(original, axis, offset, dragged.constraints(), settings)?;
            Some(Candidate {
                mutation: LayoutMutation::Split {
                    id: op.element,
                    axis,
                    at,
                    new_id: op.split_id,
                },
                guides: Vec::new(),
            })
        }
        DragKind::Swap => highlighted.first().map(|&target| Candidate {
            mutation: LayoutMutation::Swap {
                first: op.element,
                second: target,
            },
            guides: Vec::new(),
        }),
        DragKind::Merge => highlighted.first().map(|&target| Candidate {
            mutation: LayoutMutation::Merge {
                keep: op.element,
                absorb: target,
            },
            guides: Vec::new(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::layout_manager::MockLayoutStore;
    use medview_core::{LayoutPreset, Monitor, Panel, SnapModes};

    fn monitor() -> Monitor {
        Monitor::new(0, 0, 0, 1920, 1080).as_primary()
    }

    fn engine_for(layout: LayoutConfiguration, settings: SnapSettings) -> (DragEngine, Arc<LayoutManager>, EventBus) {
        let events = EventBus::new();
        let manager = Arc::new(LayoutManager::new(layout, Arc::new(MockLayoutStore::new()), events.clone()));
        (DragEngine::new(Arc::clone(&manager), settings, events.clone()), manager, events)
    }

    /// Two slots on one monitor with a 500 px gap between them.
    fn two_slots() -> (LayoutConfiguration, ElementId, ElementId) {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 500, 400)).unwrap();
        let b = LayoutElement::viewport_slot(MonitorId(0), Rect::new(1000, 0, 500, 400)).unwrap();
        let (ia, ib) = (a.id(), b.id());
        (LayoutConfiguration::from_parts("pair", vec![monitor()], vec![a, b]).unwrap(), ia, ib)
    }

    fn at(x: i32, y: i32) -> PointerPosition {
        PointerPosition::new(MonitorId(0), x, y)
    }

    const P: PointerId = PointerId(1);

    #[tokio::test]
    async fn test_move_snaps_right_edge_to_neighbour_on_drop() {
        // Arrange
        let (layout, a, b) = two_slots();
        let settings = SnapSettings {
            modes: SnapModes::GRID | SnapModes::ELEMENT_EDGE,
            ..SnapSettings::default()
        };
        let (engine, manager, _) = engine_for(layout, settings);
        engine.begin(P, a, DragKind::Move, at(250, 200)).unwrap();

        // Act: 487 px to the right leaves the right edge 13 px short of B
        engine.update(P, at(737, 200)).unwrap();
        let outcome = engine.end(P).await.unwrap();

        // Assert
        let DropOutcome::Committed(layout) = outcome else {
            panic!("drop was not committed");
        };
        let (ra, rb) = (layout.element(a).unwrap().rect(), layout.element(b).unwrap().rect());
        assert_eq!(ra.right(), rb.x);
        assert_eq!(manager.current().version(), 1);
    }

    #[tokio::test]
    async fn test_cancel_restores_original_configuration_exactly() {
        let (layout, a, _) = two_slots();
        let (engine, manager, _) = engine_for(layout, SnapSettings::default());
        let before = manager.current();
        engine.begin(P, a, DragKind::Resize(ResizeHandle::BottomRight), at(499, 399)).unwrap();
        engine.update(P, at(700, 600)).unwrap();
        assert_ne!(engine.preview(P).unwrap(), *before);

        engine.cancel(P, CancelReason::Escape).unwrap();

        assert_eq!(*manager.current(), *before);
        assert!(!engine.is_active(P));
    }

    #[test]
    fn test_second_drag_on_same_pointer_is_rejected() {
        let (layout, a, b) = two_slots();
        let (engine, _, _) = engine_for(layout, SnapSettings::default());
        engine.begin(P, a, DragKind::Move, at(10, 10)).unwrap();

        let second = engine.begin(P, b, DragKind::Move, at(1010, 10));

        assert_eq!(second, Err(DragError::AlreadyActive(P)));
        assert!(engine.begin(PointerId(2), b, DragKind::Move, at(1010, 10)).is_ok());
    }

    #[test]
    fn test_pointer_leaving_canvas_cancels_drag() {
        let (layout, a, _) = two_slots();
        let (engine, _, events) = engine_for(layout, SnapSettings::default());
        let (_, mut rx) = events.subscribe();
        engine.begin(P, a, DragKind::Move, at(10, 10)).unwrap();

        let update = engine.update(P, at(-5, 10)).unwrap();

        assert_eq!(update, DragUpdate::Cancelled(CancelReason::PointerLeftCanvas));
        assert!(!engine.is_active(P));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::DragCancelled {
                pointer: P,
                element: a,
                reason: CancelReason::PointerLeftCanvas
            }
        );
    }

    #[test]
    fn test_resize_candidate_is_clamped_to_constraints() {
        let (layout, a, _) = two_slots();
        let (engine, _, _) = engine_for(layout, SnapSettings { modes: SnapModes::NONE, ..SnapSettings::default() });
        engine.begin(P, a, DragKind::Resize(ResizeHandle::Right), at(499, 100)).unwrap();

        let DragUpdate::Preview(preview) = engine.update(P, at(10, 100)).unwrap() else {
            panic!("expected a preview");
        };

        // Minimum viewport width is 160.
        assert_eq!(preview.rect, Some(Rect::new(0, 0, 160, 400)));
    }

    #[test]
    fn test_move_into_neighbour_keeps_last_valid_candidate() {
        let (layout, a, _) = two_slots();
        let (engine, _, _) = engine_for(layout, SnapSettings { modes: SnapModes::NONE, ..SnapSettings::default() });
        engine.begin(P, a, DragKind::Move, at(0, 0)).unwrap();
        engine.update(P, at(100, 0)).unwrap();

        let DragUpdate::Preview(preview) = engine.update(P, at(800, 0)).unwrap() else {
            panic!("expected a preview");
        };

        assert_eq!(preview.rect, Some(Rect::new(100, 0, 500, 400)));
    }

    #[tokio::test]
    async fn test_swap_highlights_target_within_trigger_radius() {
        // Arrange
        let layout = LayoutPreset::DualHorizontal.build(vec![monitor()]).unwrap();
        let (left, right) = (layout.viewport_slots()[0].id, layout.viewport_slots()[1].id);
        let (engine, _, _) = engine_for(layout, SnapSettings::default());
        let targets = engine.begin(P, left, DragKind::Swap, at(100, 100)).unwrap();
        assert_eq!(targets.len(), 1);

        // Act
        let DragUpdate::Preview(preview) = engine.update(P, at(1200, 300)).unwrap() else {
            panic!("expected a preview");
        };
        let outcome = engine.end(P).await.unwrap();

        // Assert
        assert_eq!(preview.highlighted, vec![right]);
        let DropOutcome::Committed(layout) = outcome else {
            panic!("swap was not committed");
        };
        assert_eq!(layout.element(left).unwrap().rect(), Rect::new(960, 0, 960, 1080));
    }

    #[tokio::test]
    async fn test_drop_without_candidate_is_cancelled_as_invalid_target() {
        let layout = LayoutPreset::DualHorizontal.build(vec![monitor()]).unwrap();
        let left = layout.viewport_slots()[0].id;
        let (engine, manager, _) = engine_for(layout, SnapSettings::default());
        let before = manager.current();
        engine.begin(P, left, DragKind::Merge, at(100, 100)).unwrap();
        engine.update(P, at(150, 100)).unwrap();

        let outcome = engine.end(P).await.unwrap();

        assert_eq!(outcome, DropOutcome::Cancelled(CancelReason::InvalidTarget));
        assert_eq!(*manager.current(), *before);
    }

    #[tokio::test]
    async fn test_split_then_merge_by_drag() {
        // Arrange
        let layout = LayoutPreset::Single.build(vec![monitor()]).unwrap();
        let slot = layout.viewport_slots()[0].id;
        let (engine, manager, _) = engine_for(layout, SnapSettings::default());

        // Act: split at the pointer, then merge the halves back
        engine.begin(P, slot, DragKind::Split(Axis::X), at(600, 500)).unwrap();
        engine.update(P, at(643, 500)).unwrap();
        let DropOutcome::Committed(split) = engine.end(P).await.unwrap() else {
            panic!("split was not committed");
        };
        assert_eq!(split.element(slot).unwrap().rect(), Rect::new(0, 0, 640, 1080));
        let other = split.viewport_slots()[1].id;

        engine.begin(P, slot, DragKind::Merge, at(600, 500)).unwrap();
        engine.update(P, at(700, 500)).unwrap();
        engine.end(P).await.unwrap();

        // Assert
        let merged = manager.current();
        assert_eq!(merged.elements().len(), 1);
        assert!(merged.element(other).is_none());
        assert_eq!(merged.element(slot).unwrap().rect(), Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_fixed_panel_cannot_be_dragged() {
        let panel = LayoutElement::from(
            Panel::new(MonitorId(0), Rect::new(0, 1000, 1920, 80), "status")
                .unwrap()
                .fixed(),
        );
        let id = panel.id();
        let layout = LayoutConfiguration::from_parts("status", vec![monitor()], vec![panel]).unwrap();
        let (engine, _, _) = engine_for(layout, SnapSettings::default());

        assert_eq!(
            engine.begin(P, id, DragKind::Move, at(5, 1010)),
            Err(DragError::Unsupported { element: id, kind: "move" })
        );
        assert!(matches!(
            engine.begin(P, id, DragKind::Split(Axis::X), at(5, 1010)),
            Err(DragError::Unsupported { .. })
        ));
    }
}
