//! Snapping and clamping math for interactive move/resize.
//!
//! Given the geometry a pointer proposes, these functions return the
//! geometry the drag engine should actually offer.  Snapping happens per
//! axis in two stages:
//!
//! 1. **Grid** – the moving edge (the left/top edge for a move) is rounded
//!    to the nearest multiple of the grid size.
//! 2. **Edges** – element-edge and monitor-edge candidates are pooled and
//!    the one closest to any moving edge wins, provided it lies within that
//!    mode's tolerance.
//!
//! The snapped geometry is finally clamped to the monitor bounds and the
//! element's size constraints, so a value returned from here is always a
//! legal placement for that element.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use super::geometry::{Axis, Edge, Rect};
use super::layout::{ElementId, LayoutConfiguration, SizeConstraints};

/// Bit set of enabled snap behaviours.
///
/// - Bit 0: grid
/// - Bit 1: element edges
/// - Bit 2: monitor edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SnapModes(pub u8);

impl SnapModes {
    pub const NONE: SnapModes = SnapModes(0);
    pub const GRID: SnapModes = SnapModes(1 << 0);
    pub const ELEMENT_EDGE: SnapModes = SnapModes(1 << 1);
    pub const MONITOR_EDGE: SnapModes = SnapModes(1 << 2);
    pub const ALL: SnapModes = SnapModes(0b111);

    /// Returns `true` if every mode in `other` is enabled.
    pub fn contains(self, other: SnapModes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parses a mode name as written in the config file.
    pub fn from_name(name: &str) -> Option<SnapModes> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "grid" => Some(SnapModes::GRID),
            "element_edge" | "element" => Some(SnapModes::ELEMENT_EDGE),
            "monitor_edge" | "monitor" => Some(SnapModes::MONITOR_EDGE),
            _ => None,
        }
    }
}

impl BitOr for SnapModes {
    type Output = SnapModes;

    fn bitor(self, rhs: SnapModes) -> SnapModes {
        SnapModes(self.0 | rhs.0)
    }
}

/// Tunable snapping behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapSettings {
    pub modes: SnapModes,
    /// Grid pitch in pixels; 0 or 1 disables quantisation.
    pub grid_size: u32,
    /// Maximum distance at which a neighbouring element's edge attracts.
    pub element_tolerance: u32,
    /// Maximum distance at which a monitor edge attracts.
    pub monitor_tolerance: u32,
    /// Radius around a drop target within which it is highlighted.
    pub trigger_radius: u32,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            modes: SnapModes::ALL,
            grid_size: 8,
            element_tolerance: 12,
            monitor_tolerance: 16,
            trigger_radius: 48,
        }
    }
}

/// Which edge or corner a resize drags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeHandle {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ResizeHandle {
    /// Returns `true` if dragging this handle moves `edge`.
    pub fn moves(self, edge: Edge) -> bool {
        use ResizeHandle::*;
        match edge {
            Edge::Top => matches!(self, Top | TopLeft | TopRight),
            Edge::Bottom => matches!(self, Bottom | BottomLeft | BottomRight),
            Edge::Left => matches!(self, Left | TopLeft | BottomLeft),
            Edge::Right => matches!(self, Right | TopRight | BottomRight),
        }
    }
}

/// What produced a snap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapSource {
    Grid,
    Element(ElementId),
    Monitor,
}

/// A line the geometry was snapped to.  `Axis::X` guides are vertical lines
/// at an X coordinate; `Axis::Y` guides are horizontal lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapGuide {
    pub axis: Axis,
    pub position: i32,
    pub source: SnapSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapResult {
    pub rect: Rect,
    pub guides: Vec<SnapGuide>,
}

/// The surroundings of the element being dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapContext {
    /// Monitor bounds in monitor-local coordinates.
    pub bounds: Rect,
    /// Other elements on the same monitor.
    pub neighbours: Vec<(ElementId, Rect)>,
}

impl SnapContext {
    /// Builds the context for `element` from a layout.
    pub fn for_element(config: &LayoutConfiguration, element: ElementId) -> Option<Self> {
        let target = config.element(element)?;
        let monitor = config.monitor(target.monitor())?;
        let neighbours = config
            .elements()
            .iter()
            .filter(|e| e.id() != element && e.monitor() == monitor.id)
            .map(|e| (e.id(), e.rect()))
            .collect();
        Some(Self {
            bounds: monitor.bounds(),
            neighbours,
        })
    }
}

// ── Snapping ──────────────────────────────────────────────────────────────────

/// Snaps a proposed move of a `rect`-sized element, then clamps it inside the
/// monitor.
pub fn snap_move(proposed: Rect, context: &SnapContext, settings: &SnapSettings) -> SnapResult {
    let mut guides = Vec::new();
    let mut rect = proposed;

    if settings.modes.contains(SnapModes::GRID) && settings.grid_size > 1 {
        rect.x = round_to_grid(rect.x, settings.grid_size);
        rect.y = round_to_grid(rect.y, settings.grid_size);
    }

    let x_edges = [rect.x, rect.right()];
    if let Some(best) = best_candidate(&x_edges, &targets(Axis::X, context, settings)) {
        rect.x += best.delta;
        guides.push(best.guide(Axis::X));
    }
    let y_edges = [rect.y, rect.bottom()];
    if let Some(best) = best_candidate(&y_edges, &targets(Axis::Y, context, settings)) {
        rect.y += best.delta;
        guides.push(best.guide(Axis::Y));
    }

    let clamped = clamp_move(rect, &context.bounds);
    guides.retain(|g| match g.axis {
        Axis::X => clamped.x == rect.x,
        Axis::Y => clamped.y == rect.y,
    });
    SnapResult {
        rect: clamped,
        guides,
    }
}

/// Snaps a resize of `original` by dragging `handle` by `(dx, dy)`, then
/// clamps the result to `constraints` and the monitor.  Edges the handle
/// does not move stay exactly where they were.
pub fn snap_resize(
    original: Rect,
    handle: ResizeHandle,
    dx: i32,
    dy: i32,
    constraints: &SizeConstraints,
    context: &SnapContext,
    settings: &SnapSettings,
) -> SnapResult {
    let mut guides = Vec::new();
    let mut edges = [
        (Edge::Left, original.x),
        (Edge::Top, original.y),
        (Edge::Right, original.right()),
        (Edge::Bottom, original.bottom()),
    ];
    let x_targets = targets(Axis::X, context, settings);
    let y_targets = targets(Axis::Y, context, settings);

    for (edge, value) in edges.iter_mut() {
        if !handle.moves(*edge) {
            continue;
        }
        let (axis, delta, candidates) = if edge.is_vertical() {
            (Axis::X, dx, &x_targets)
        } else {
            (Axis::Y, dy, &y_targets)
        };
        *value += delta;
        if settings.modes.contains(SnapModes::GRID) && settings.grid_size > 1 {
            *value = round_to_grid(*value, settings.grid_size);
        }
        if let Some(best) = best_candidate(&[*value], candidates) {
            *value += best.delta;
            guides.push(best.guide(axis));
        }
    }

    let [(_, left), (_, top), (_, right), (_, bottom)] = edges;
    let rect = clamp_resize(original, handle, left, top, right, bottom, constraints, &context.bounds);
    guides.retain(|g| match g.axis {
        Axis::X => g.position == rect.x || g.position == rect.right(),
        Axis::Y => g.position == rect.y || g.position == rect.bottom(),
    });
    SnapResult { rect, guides }
}

/// Picks where a split along `axis` divides `rect`, given the pointer's
/// offset from the rectangle's start edge.
///
/// The cut is grid-snapped, then clamped so both halves keep the minimum
/// size.  Returns `None` when the element is too small to split at all.
pub fn snap_split(
    rect: Rect,
    axis: Axis,
    offset: i32,
    constraints: &SizeConstraints,
    settings: &SnapSettings,
) -> Option<u32> {
    let (start, length, min) = match axis {
        Axis::X => (rect.x, rect.width, constraints.min_width),
        Axis::Y => (rect.y, rect.height, constraints.min_height),
    };
    let min = min.max(1);
    if length < min.saturating_mul(2) {
        return None;
    }
    let mut cut = start + offset;
    if settings.modes.contains(SnapModes::GRID) && settings.grid_size > 1 {
        cut = round_to_grid(cut, settings.grid_size);
    }
    let at = (cut - start).clamp(min as i32, (length - min) as i32);
    Some(at as u32)
}

// ── Clamping ──────────────────────────────────────────────────────────────────

/// Keeps a rectangle of unchanged size inside `bounds`.
pub fn clamp_move(rect: Rect, bounds: &Rect) -> Rect {
    let max_x = (bounds.right() - rect.width as i32).max(bounds.x);
    let max_y = (bounds.bottom() - rect.height as i32).max(bounds.y);
    Rect {
        x: rect.x.clamp(bounds.x, max_x),
        y: rect.y.clamp(bounds.y, max_y),
        ..rect
    }
}

/// Clamps the proposed edges of a resize.
///
/// Fixed edges are taken from `original`; each moving edge is limited so
/// the size stays within `constraints` and the rectangle stays inside
/// `bounds`.
#[allow(clippy::too_many_arguments)]
pub fn clamp_resize(
    original: Rect,
    handle: ResizeHandle,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    constraints: &SizeConstraints,
    bounds: &Rect,
) -> Rect {
    let (left, right) = clamp_span(
        (original.x, original.right()),
        (left, right),
        handle.moves(Edge::Left),
        handle.moves(Edge::Right),
        (constraints.min_width, constraints.max_width),
        (bounds.x, bounds.right()),
    );
    let (top, bottom) = clamp_span(
        (original.y, original.bottom()),
        (top, bottom),
        handle.moves(Edge::Top),
        handle.moves(Edge::Bottom),
        (constraints.min_height, constraints.max_height),
        (bounds.y, bounds.bottom()),
    );
    Rect::from_edges(left, top, right, bottom)
}

fn clamp_span(
    original: (i32, i32),
    proposed: (i32, i32),
    moves_start: bool,
    moves_end: bool,
    (min_len, max_len): (u32, u32),
    (lower, upper): (i32, i32),
) -> (i32, i32) {
    let min_len = i64::from(min_len);
    let max_len = i64::from(max_len);
    let (lower, upper) = (i64::from(lower), i64::from(upper));
    let (mut start, mut end) = (i64::from(original.0), i64::from(original.1));

    if moves_start {
        let lo = (end - max_len).max(lower);
        let hi = end - min_len;
        start = i64::from(proposed.0).max(lo).min(hi.max(lo));
    }
    if moves_end {
        let lo = start + min_len;
        let hi = (start + max_len).min(upper);
        end = i64::from(proposed.1).min(hi).max(lo.min(hi));
    }
    (start as i32, end as i32)
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn round_to_grid(value: i32, grid: u32) -> i32 {
    let grid = grid as i32;
    (value + grid / 2).div_euclid(grid) * grid
}

#[derive(Debug, Clone, Copy)]
struct Target {
    position: i32,
    source: SnapSource,
    tolerance: u32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    delta: i32,
    position: i32,
    source: SnapSource,
}

impl Candidate {
    fn guide(self, axis: Axis) -> SnapGuide {
        SnapGuide {
            axis,
            position: self.position,
            source: self.source,
        }
    }
}

fn targets(axis: Axis, context: &SnapContext, settings: &SnapSettings) -> Vec<Target> {
    let mut targets = Vec::new();
    if settings.modes.contains(SnapModes::ELEMENT_EDGE) {
        for (id, rect) in &context.neighbours {
            let (start, end) = match axis {
                Axis::X => (rect.x, rect.right()),
                Axis::Y => (rect.y, rect.bottom()),
            };
            for position in [start, end] {
                targets.push(Target {
                    position,
                    source: SnapSource::Element(*id),
                    tolerance: settings.element_tolerance,
                });
            }
        }
    }
    if settings.modes.contains(SnapModes::MONITOR_EDGE) {
        let (start, end) = match axis {
            Axis::X => (context.bounds.x, context.bounds.right()),
            Axis::Y => (context.bounds.y, context.bounds.bottom()),
        };
        for position in [start, end] {
            targets.push(Target {
                position,
                source: SnapSource::Monitor,
                tolerance: settings.monitor_tolerance,
            });
        }
    }
    targets
}

/// The smallest in-tolerance correction bringing any of `edges` onto a
/// target.  Earlier targets win ties.
fn best_candidate(edges: &[i32], targets: &[Target]) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for &edge in edges {
        for target in targets {
            let delta = target.position - edge;
            if delta.unsigned_abs() > target.tolerance {
                continue;
            }
            if best.map_or(true, |b| delta.abs() < b.delta.abs()) {
                best = Some(Candidate {
                    delta,
                    position: target.position,
                    source: target.source,
                });
            }
        }
    }
    best
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context_with_neighbour(neighbour: Rect) -> (SnapContext, ElementId) {
        let id = Uuid::new_v4();
        let context = SnapContext {
            bounds: Rect::new(0, 0, 1920, 1080),
            neighbours: vec![(id, neighbour)],
        };
        (context, id)
    }

    #[test]
    fn test_snap_modes_combine_with_bitor() {
        let modes = SnapModes::GRID | SnapModes::ELEMENT_EDGE;
        assert!(modes.contains(SnapModes::GRID));
        assert!(modes.contains(SnapModes::ELEMENT_EDGE));
        assert!(!modes.contains(SnapModes::MONITOR_EDGE));
        assert_eq!(SnapModes::from_name("monitor-edge"), Some(SnapModes::MONITOR_EDGE));
    }

    #[test]
    fn test_grid_then_element_edge_aligns_right_edge_with_neighbour() {
        // Arrange: A is 600 wide, B starts at x = 1000
        let (context, b) = context_with_neighbour(Rect::new(1000, 0, 600, 500));
        let settings = SnapSettings {
            modes: SnapModes::GRID | SnapModes::ELEMENT_EDGE,
            grid_size: 16,
            element_tolerance: 20,
            ..SnapSettings::default()
        };

        // Act: pointer dragged A by +387 px
        let result = snap_move(Rect::new(387, 0, 600, 500), &context, &settings);

        // Assert
        assert_eq!(result.rect.right(), 1000);
        assert!(result.guides.iter().any(|g| g.source == SnapSource::Element(b)));
    }

    #[test]
    fn test_grid_only_quantises_position() {
        let (context, _) = context_with_neighbour(Rect::new(1000, 0, 600, 500));
        let settings = SnapSettings {
            modes: SnapModes::GRID,
            grid_size: 16,
            ..SnapSettings::default()
        };
        let result = snap_move(Rect::new(387, 13, 600, 500), &context, &settings);
        assert_eq!((result.rect.x, result.rect.y), (384, 16));
        assert!(result.guides.is_empty());
    }

    #[test]
    fn test_edge_out_of_tolerance_does_not_snap() {
        let (context, _) = context_with_neighbour(Rect::new(1000, 0, 600, 500));
        let settings = SnapSettings {
            modes: SnapModes::ELEMENT_EDGE,
            element_tolerance: 5,
            ..SnapSettings::default()
        };
        let result = snap_move(Rect::new(300, 200, 600, 500), &context, &settings);
        assert_eq!(result.rect, Rect::new(300, 200, 600, 500));
    }

    #[test]
    fn test_monitor_edge_snaps_and_move_is_clamped() {
        let context = SnapContext {
            bounds: Rect::new(0, 0, 1920, 1080),
            neighbours: vec![],
        };
        let settings = SnapSettings {
            modes: SnapModes::MONITOR_EDGE,
            ..SnapSettings::default()
        };
        let near = snap_move(Rect::new(1310, 10, 600, 500), &context, &settings);
        assert_eq!((near.rect.right(), near.rect.y), (1920, 0));

        let beyond = snap_move(Rect::new(1700, -300, 600, 500), &context, &settings);
        assert_eq!((beyond.rect.right(), beyond.rect.y), (1920, 0));
    }

    #[test]
    fn test_resize_keeps_fixed_edges() {
        let context = SnapContext {
            bounds: Rect::new(0, 0, 1920, 1080),
            neighbours: vec![],
        };
        let settings = SnapSettings {
            modes: SnapModes::NONE,
            ..SnapSettings::default()
        };
        let original = Rect::new(100, 100, 400, 300);
        let result = snap_resize(
            original,
            ResizeHandle::BottomRight,
            50,
            -20,
            &SizeConstraints::at_least(160, 120),
            &context,
            &settings,
        );
        assert_eq!(result.rect, Rect::new(100, 100, 450, 280));
    }

    #[test]
    fn test_resize_is_clamped_to_min_size() {
        let context = SnapContext {
            bounds: Rect::new(0, 0, 1920, 1080),
            neighbours: vec![],
        };
        let settings = SnapSettings {
            modes: SnapModes::NONE,
            ..SnapSettings::default()
        };
        let original = Rect::new(100, 100, 400, 300);
        let result = snap_resize(
            original,
            ResizeHandle::Left,
            390,
            0,
            &SizeConstraints::at_least(160, 120),
            &context,
            &settings,
        );
        assert_eq!(result.rect, Rect::new(340, 100, 160, 300));
    }

    #[test]
    fn test_resize_is_clamped_to_monitor_bounds() {
        let context = SnapContext {
            bounds: Rect::new(0, 0, 1920, 1080),
            neighbours: vec![],
        };
        let settings = SnapSettings {
            modes: SnapModes::NONE,
            ..SnapSettings::default()
        };
        let result = snap_resize(
            Rect::new(1500, 0, 400, 300),
            ResizeHandle::Right,
            500,
            0,
            &SizeConstraints::at_least(160, 120),
            &context,
            &settings,
        );
        assert_eq!(result.rect.right(), 1920);
    }

    #[test]
    fn test_resize_snaps_moving_edge_to_neighbour() {
        let (context, b) = context_with_neighbour(Rect::new(1000, 0, 600, 500));
        let settings = SnapSettings {
            modes: SnapModes::ELEMENT_EDGE,
            element_tolerance: 10,
            ..SnapSettings::default()
        };
        let result = snap_resize(
            Rect::new(0, 0, 600, 500),
            ResizeHandle::Right,
            393,
            0,
            &SizeConstraints::at_least(160, 120),
            &context,
            &settings,
        );
        assert_eq!(result.rect, Rect::new(0, 0, 1000, 500));
        assert_eq!(result.guides[0].source, SnapSource::Element(b));
    }

    #[test]
    fn test_split_position_is_grid_snapped_and_keeps_minimum_halves() {
        let rect = Rect::new(100, 0, 960, 540);
        let constraints = SizeConstraints::at_least(160, 120);
        let settings = SnapSettings::default();

        // cut at 100 + 477 = 577 rounds to 576
        assert_eq!(snap_split(rect, Axis::X, 477, &constraints, &settings), Some(476));
        assert_eq!(snap_split(rect, Axis::X, 20, &constraints, &settings), Some(160));
        assert_eq!(snap_split(rect, Axis::Y, 530, &constraints, &settings), Some(420));
        assert_eq!(
            snap_split(Rect::new(0, 0, 300, 540), Axis::X, 150, &constraints, &settings),
            None
        );
    }

    #[test]
    fn test_round_to_grid_handles_negative_values() {
        assert_eq!(round_to_grid(-7, 16), 0);
        assert_eq!(round_to_grid(-9, 16), -16);
        assert_eq!(round_to_grid(24, 16), 32);
    }

    #[test]
    fn test_resize_handle_moves_expected_edges() {
        assert!(ResizeHandle::TopLeft.moves(Edge::Top));
        assert!(ResizeHandle::TopLeft.moves(Edge::Left));
        assert!(!ResizeHandle::TopLeft.moves(Edge::Right));
        assert!(!ResizeHandle::Bottom.moves(Edge::Left));
    }
}
