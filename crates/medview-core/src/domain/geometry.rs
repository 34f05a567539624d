//! Integer pixel geometry shared by the layout, snapping and viewport code.
//!
//! All rectangles handled by the layout engine are expressed in
//! **monitor-local** coordinates: `(0, 0)` is the top-left pixel of the
//! monitor the element is assigned to.  Right and bottom edges are exclusive,
//! so two rectangles that merely touch (`a.right() == b.x`) do not overlap.

use serde::{Deserialize, Serialize};

/// A point in monitor-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other` in pixels.
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle.
///
/// `x` and `y` are the top-left corner; `width` and `height` are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from its four edges.  Inverted edges collapse to a
    /// zero-sized rectangle anchored at `left`/`top`.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        }
    }

    /// Returns the rightmost X coordinate (exclusive).
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Returns the bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Returns the coordinate of the requested edge.
    pub fn edge(&self, edge: Edge) -> i32 {
        match edge {
            Edge::Left => self.x,
            Edge::Right => self.right(),
            Edge::Top => self.y,
            Edge::Bottom => self.bottom(),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if this region overlaps with `other`.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Returns `true` if `inner` lies entirely inside this rectangle.
    pub fn contains_rect(&self, inner: &Rect) -> bool {
        inner.x >= self.x
            && inner.y >= self.y
            && inner.right() <= self.right()
            && inner.bottom() <= self.bottom()
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Self {
        Self::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Distance from `p` to the nearest point of this rectangle (0 inside).
    pub fn distance_to_point(&self, p: Point) -> f64 {
        let dx = if p.x < self.x {
            self.x - p.x
        } else if p.x >= self.right() {
            p.x - (self.right() - 1)
        } else {
            0
        };
        let dy = if p.y < self.y {
            self.y - p.y
        } else if p.y >= self.bottom() {
            p.y - (self.bottom() - 1)
        } else {
            0
        };
        f64::from(dx).hypot(f64::from(dy))
    }
}

/// The four edges of a rectangular region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    /// Edges whose coordinate is an X value (vertical lines).
    pub fn is_vertical(self) -> bool {
        matches!(self, Edge::Left | Edge::Right)
    }
}

/// The axis along which an element is divided.
///
/// `X` cuts the element with a vertical line (left and right halves);
/// `Y` cuts it with a horizontal line (top and bottom halves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Length of `rect` along this axis.
    pub fn length_of(self, rect: &Rect) -> u32 {
        match self {
            Axis::X => rect.width,
            Axis::Y => rect.height,
        }
    }
}

/// Returns `true` if the two 1-D intervals `[a_start, a_end)` and
/// `[b_start, b_end)` overlap.  Intervals that only touch do not overlap.
pub fn ranges_overlap(a_start: i32, a_end: i32, b_start: i32, b_end: i32) -> bool {
    a_start < b_end && b_start < a_end
}

/// Maps `pos` on a span of `from_length` pixels proportionally onto a span of
/// `to_length` pixels.
pub fn map_proportional(from_length: u32, to_length: u32, pos: i32) -> i32 {
    if from_length == 0 {
        return 0;
    }
    let end = i32::try_from(from_length).unwrap_or(i32::MAX);
    let t = f64::from(pos.clamp(0, end)) / f64::from(from_length);
    (t * f64::from(to_length)) as i32
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_right_and_bottom_are_exclusive() {
        let r = Rect::new(100, 50, 1920, 1080);
        assert_eq!(r.right(), 2020);
        assert_eq!(r.bottom(), 1130);
    }

    #[test]
    fn test_map_proportional_handles_lengths_beyond_i32() {
        assert_eq!(map_proportional(1920, 1280, 960), 640);
        assert_eq!(map_proportional(3_000_000_000, 1000, 1_500_000_000), 500);
        assert_eq!(map_proportional(u32::MAX, 1000, -5), 0);
    }

    #[test]
    fn test_touching_rects_do_not_overlap() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(100, 0, 100, 100);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_rects_sharing_area_overlap() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_contains_rect_accepts_exact_fit() {
        let monitor = Rect::new(0, 0, 1920, 1080);
        assert!(monitor.contains_rect(&Rect::new(0, 0, 1920, 1080)));
        assert!(!monitor.contains_rect(&Rect::new(1, 0, 1920, 1080)));
        assert!(!monitor.contains_rect(&Rect::new(-1, 0, 10, 10)));
    }

    #[test]
    fn test_from_edges_collapses_inverted_edges() {
        let r = Rect::from_edges(10, 10, 5, 20);
        assert_eq!(r.width, 0);
        assert_eq!(r.height, 10);
    }

    #[test]
    fn test_union_covers_both_rects() {
        let a = Rect::new(0, 0, 100, 50);
        let b = Rect::new(100, 0, 60, 50);
        assert_eq!(a.union(&b), Rect::new(0, 0, 160, 50));
    }

    #[test]
    fn test_distance_to_point_is_zero_inside() {
        let r = Rect::new(10, 10, 100, 100);
        assert_eq!(r.distance_to_point(Point::new(50, 50)), 0.0);
        assert_eq!(r.distance_to_point(Point::new(5, 50)), 5.0);
    }

    #[test]
    fn test_ranges_overlap_returns_false_for_adjacent_ranges() {
        assert!(ranges_overlap(0, 100, 50, 150));
        assert!(!ranges_overlap(0, 100, 100, 200));
    }

    #[test]
    fn test_map_proportional_scales_position() {
        assert_eq!(map_proportional(1000, 2000, 250), 500);
        assert_eq!(map_proportional(0, 2000, 250), 0);
        assert_eq!(map_proportional(1000, 2000, 5000), 2000);
    }
}
