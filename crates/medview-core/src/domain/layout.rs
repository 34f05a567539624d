//! Screen layout domain entity.
//!
//! A [`LayoutConfiguration`] describes every region shown on every physical
//! monitor: viewport slots that display images, toolbars and panels.  The
//! configuration is a *value*: mutations never edit it in place.  Instead
//! [`LayoutConfiguration::apply`] clones it, applies one [`LayoutMutation`],
//! re-validates every invariant and only then hands back the new value.  A
//! rejected mutation therefore cannot leave a half-applied layout behind.
//!
//! # Invariants
//!
//! - At least one monitor is described; monitor ids are unique and every
//!   monitor has a non-zero size.
//! - Element ids are unique.
//! - Every element references an existing monitor and its rectangle lies
//!   fully inside that monitor's bounds (monitor-local coordinates).
//! - Every element's size respects its min/max [`SizeConstraints`].
//! - Two elements on the same monitor with the same z-order never overlap
//!   unless one of them is flagged as `stacked`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::geometry::{map_proportional, Axis, Rect};
use super::preset::LayoutPreset;

/// Unique identifier of a layout element, derived from UUID v4.
pub type ElementId = Uuid;

/// Identifies a physical monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(pub u32);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor-{}", self.0)
    }
}

/// A physical display.
///
/// `origin_x` / `origin_y` place the monitor on the desktop; element
/// rectangles are always relative to the monitor's own top-left corner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub primary: bool,
}

impl Monitor {
    pub fn new(id: u32, origin_x: i32, origin_y: i32, width: u32, height: u32) -> Self {
        Self {
            id: MonitorId(id),
            origin_x,
            origin_y,
            width,
            height,
            primary: false,
        }
    }

    /// Marks this monitor as the primary display.
    pub fn as_primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Bounds in monitor-local coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Bounds in desktop coordinates.
    pub fn desktop_bounds(&self) -> Rect {
        Rect::new(self.origin_x, self.origin_y, self.width, self.height)
    }
}

// ── Size constraints ──────────────────────────────────────────────────────────

/// Inclusive min/max size of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeConstraints {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl SizeConstraints {
    pub const fn new(min_width: u32, min_height: u32, max_width: u32, max_height: u32) -> Self {
        Self {
            min_width,
            min_height,
            max_width,
            max_height,
        }
    }

    /// Only a lower bound; the monitor bounds cap the size from above.
    pub const fn at_least(min_width: u32, min_height: u32) -> Self {
        Self::new(min_width, min_height, u32::MAX, u32::MAX)
    }

    /// Returns the first rule a `width` × `height` element would break.
    pub fn check(&self, width: u32, height: u32) -> Result<(), Constraint> {
        if self.min_width > self.max_width || self.min_height > self.max_height {
            return Err(Constraint::InvertedRange);
        }
        if width == 0 || height == 0 {
            return Err(Constraint::ZeroSize);
        }
        if width < self.min_width {
            return Err(Constraint::MinWidth {
                min: self.min_width,
                actual: width,
            });
        }
        if width > self.max_width {
            return Err(Constraint::MaxWidth {
                max: self.max_width,
                actual: width,
            });
        }
        if height < self.min_height {
            return Err(Constraint::MinHeight {
                min: self.min_height,
                actual: height,
            });
        }
        if height > self.max_height {
            return Err(Constraint::MaxHeight {
                max: self.max_height,
                actual: height,
            });
        }
        Ok(())
    }

    pub fn clamp_width(&self, width: u32) -> u32 {
        width.max(self.min_width).min(self.max_width)
    }

    pub fn clamp_height(&self, height: u32) -> u32 {
        height.max(self.min_height).min(self.max_height)
    }
}

/// The specific size rule a rejected element violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    ZeroSize,
    InvertedRange,
    MinWidth { min: u32, actual: u32 },
    MaxWidth { max: u32, actual: u32 },
    MinHeight { min: u32, actual: u32 },
    MaxHeight { max: u32, actual: u32 },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::ZeroSize => f.write_str("non-zero size"),
            Constraint::InvertedRange => f.write_str("min <= max"),
            Constraint::MinWidth { min, actual } => write!(f, "min width {min} (got {actual})"),
            Constraint::MaxWidth { max, actual } => write!(f, "max width {max} (got {actual})"),
            Constraint::MinHeight { min, actual } => write!(f, "min height {min} (got {actual})"),
            Constraint::MaxHeight { max, actual } => write!(f, "max height {max} (got {actual})"),
        }
    }
}

/// Errors that can occur when building or mutating a layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("element {element} violates size constraint: {constraint}")]
    ConstraintViolated {
        element: ElementId,
        constraint: Constraint,
    },

    #[error("element {element} extends beyond the bounds of {monitor}")]
    OutOfMonitorBounds {
        element: ElementId,
        monitor: MonitorId,
    },

    #[error("elements {first} and {second} overlap at z-order {z_order}")]
    Overlap {
        first: ElementId,
        second: ElementId,
        z_order: i32,
    },

    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("{0} does not exist in this layout")]
    MonitorNotFound(MonitorId),

    #[error("duplicate element id: {0}")]
    DuplicateElement(ElementId),

    #[error("{0} is duplicated or has a zero size")]
    InvalidMonitor(MonitorId),

    #[error("a layout must describe at least one monitor")]
    NoMonitors,

    #[error("element {0} is not movable")]
    NotMovable(ElementId),

    #[error("element {0} is not resizable")]
    NotResizable(ElementId),

    #[error("cannot {operation} elements {first} and {second}: incompatible kinds")]
    Incompatible {
        first: ElementId,
        second: ElementId,
        operation: &'static str,
    },

    #[error("elements {first} and {second} do not share a full edge")]
    NotAdjacent { first: ElementId, second: ElementId },

    #[error("split position {at} is outside element {element}")]
    SplitOutOfRange { element: ElementId, at: u32 },
}

// ── Elements ──────────────────────────────────────────────────────────────────

/// Where an element sits: monitor, rectangle and stacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub monitor: MonitorId,
    pub rect: Rect,
    #[serde(default)]
    pub z_order: i32,
    /// Stacked elements may overlap others at the same z-order.
    #[serde(default)]
    pub stacked: bool,
}

impl Placement {
    pub fn new(monitor: MonitorId, rect: Rect) -> Self {
        Self {
            monitor,
            rect,
            z_order: 0,
            stacked: false,
        }
    }
}

/// Discriminant of [`LayoutElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    ViewportSlot,
    Toolbar,
    Panel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A region that displays one image through a viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSlot {
    pub id: ElementId,
    pub placement: Placement,
    pub constraints: SizeConstraints,
}

impl ViewportSlot {
    pub const DEFAULT_CONSTRAINTS: SizeConstraints = SizeConstraints::at_least(160, 120);

    pub fn new(monitor: MonitorId, rect: Rect) -> Result<Self, LayoutError> {
        let slot = Self {
            id: Uuid::new_v4(),
            placement: Placement::new(monitor, rect),
            constraints: Self::DEFAULT_CONSTRAINTS,
        };
        check_size(slot.id, &slot.constraints, &rect)?;
        Ok(slot)
    }
}

/// A strip of tool buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolbar {
    pub id: ElementId,
    pub placement: Placement,
    pub constraints: SizeConstraints,
    pub orientation: Orientation,
}

impl Toolbar {
    pub const DEFAULT_CONSTRAINTS: SizeConstraints = SizeConstraints::at_least(24, 24);

    pub fn new(monitor: MonitorId, rect: Rect, orientation: Orientation) -> Result<Self, LayoutError> {
        let toolbar = Self {
            id: Uuid::new_v4(),
            placement: Placement::new(monitor, rect),
            constraints: Self::DEFAULT_CONSTRAINTS,
            orientation,
        };
        check_size(toolbar.id, &toolbar.constraints, &rect)?;
        Ok(toolbar)
    }
}

/// A generic side panel (study browser, report editor, status bar, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    pub id: ElementId,
    pub placement: Placement,
    pub constraints: SizeConstraints,
    pub title: String,
    #[serde(default = "default_true")]
    pub movable: bool,
    #[serde(default = "default_true")]
    pub resizable: bool,
}

fn default_true() -> bool {
    true
}

impl Panel {
    pub const DEFAULT_CONSTRAINTS: SizeConstraints = SizeConstraints::at_least(120, 80);

    pub fn new(monitor: MonitorId, rect: Rect, title: impl Into<String>) -> Result<Self, LayoutError> {
        let panel = Self {
            id: Uuid::new_v4(),
            placement: Placement::new(monitor, rect),
            constraints: Self::DEFAULT_CONSTRAINTS,
            title: title.into(),
            movable: true,
            resizable: true,
        };
        check_size(panel.id, &panel.constraints, &rect)?;
        Ok(panel)
    }

    /// Pins the panel in place (neither movable nor resizable).
    pub fn fixed(mut self) -> Self {
        self.movable = false;
        self.resizable = false;
        self
    }
}

/// A positioned, sized, monitor-assigned region of a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutElement {
    ViewportSlot(ViewportSlot),
    Toolbar(Toolbar),
    Panel(Panel),
}

impl From<ViewportSlot> for LayoutElement {
    fn from(slot: ViewportSlot) -> Self {
        LayoutElement::ViewportSlot(slot)
    }
}

impl From<Toolbar> for LayoutElement {
    fn from(toolbar: Toolbar) -> Self {
        LayoutElement::Toolbar(toolbar)
    }
}

impl From<Panel> for LayoutElement {
    fn from(panel: Panel) -> Self {
        LayoutElement::Panel(panel)
    }
}

impl LayoutElement {
    pub fn viewport_slot(monitor: MonitorId, rect: Rect) -> Result<Self, LayoutError> {
        ViewportSlot::new(monitor, rect).map(Self::from)
    }

    pub fn toolbar(monitor: MonitorId, rect: Rect, orientation: Orientation) -> Result<Self, LayoutError> {
        Toolbar::new(monitor, rect, orientation).map(Self::from)
    }

    pub fn panel(monitor: MonitorId, rect: Rect, title: impl Into<String>) -> Result<Self, LayoutError> {
        Panel::new(monitor, rect, title).map(Self::from)
    }

    pub fn id(&self) -> ElementId {
        match self {
            LayoutElement::ViewportSlot(e) => e.id,
            LayoutElement::Toolbar(e) => e.id,
            LayoutElement::Panel(e) => e.id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            LayoutElement::ViewportSlot(_) => ElementKind::ViewportSlot,
            LayoutElement::Toolbar(_) => ElementKind::Toolbar,
            LayoutElement::Panel(_) => ElementKind::Panel,
        }
    }

    pub fn placement(&self) -> &Placement {
        match self {
            LayoutElement::ViewportSlot(e) => &e.placement,
            LayoutElement::Toolbar(e) => &e.placement,
            LayoutElement::Panel(e) => &e.placement,
        }
    }

    fn placement_mut(&mut self) -> &mut Placement {
        match self {
            LayoutElement::ViewportSlot(e) => &mut e.placement,
            LayoutElement::Toolbar(e) => &mut e.placement,
            LayoutElement::Panel(e) => &mut e.placement,
        }
    }

    pub fn constraints(&self) -> &SizeConstraints {
        match self {
            LayoutElement::ViewportSlot(e) => &e.constraints,
            LayoutElement::Toolbar(e) => &e.constraints,
            LayoutElement::Panel(e) => &e.constraints,
        }
    }

    pub fn rect(&self) -> Rect {
        self.placement().rect
    }

    pub fn monitor(&self) -> MonitorId {
        self.placement().monitor
    }

    pub fn is_movable(&self) -> bool {
        match self {
            LayoutElement::Panel(p) => p.movable,
            _ => true,
        }
    }

    pub fn is_resizable(&self) -> bool {
        match self {
            LayoutElement::Panel(p) => p.resizable,
            _ => true,
        }
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.placement_mut().z_order = z_order;
        self
    }

    /// Allows this element to overlap others at the same z-order.
    pub fn stacked(mut self) -> Self {
        self.placement_mut().stacked = true;
        self
    }

    /// Replaces the size constraints, re-checking the current rectangle.
    pub fn with_constraints(mut self, constraints: SizeConstraints) -> Result<Self, LayoutError> {
        let rect = self.rect();
        check_size(self.id(), &constraints, &rect)?;
        match &mut self {
            LayoutElement::ViewportSlot(e) => e.constraints = constraints,
            LayoutElement::Toolbar(e) => e.constraints = constraints,
            LayoutElement::Panel(e) => e.constraints = constraints,
        }
        Ok(self)
    }
}

fn check_size(element: ElementId, constraints: &SizeConstraints, rect: &Rect) -> Result<(), LayoutError> {
    constraints
        .check(rect.width, rect.height)
        .map_err(|constraint| LayoutError::ConstraintViolated { element, constraint })
}

// ── Mutations ─────────────────────────────────────────────────────────────────

/// One atomic change to a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutMutation {
    Add(LayoutElement),
    Remove(ElementId),
    /// Replaces an element's rectangle on its current monitor.
    SetRect { id: ElementId, rect: Rect },
    /// Moves an element's top-left corner, keeping its size.
    MoveTo { id: ElementId, x: i32, y: i32 },
    /// Resizes an element, keeping its top-left corner.
    Resize { id: ElementId, width: u32, height: u32 },
    /// Reassigns an element to another monitor.
    MoveToMonitor { id: ElementId, monitor: MonitorId },
    /// Exchanges the monitor and rectangle of two elements of the same kind.
    Swap { first: ElementId, second: ElementId },
    /// Divides a viewport slot at `at` pixels from its left (X) or top (Y)
    /// edge; the second half becomes a new slot with id `new_id`.
    Split {
        id: ElementId,
        axis: Axis,
        at: u32,
        new_id: ElementId,
    },
    /// Combines two adjacent viewport slots; `keep` takes the union and
    /// `absorb` is removed.
    Merge { keep: ElementId, absorb: ElementId },
}

impl LayoutMutation {
    /// Builds a split mutation with a freshly generated id for the new half.
    pub fn split(id: ElementId, axis: Axis, at: u32) -> Self {
        LayoutMutation::Split {
            id,
            axis,
            at,
            new_id: Uuid::new_v4(),
        }
    }

    /// Short operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LayoutMutation::Add(_) => "add",
            LayoutMutation::Remove(_) => "remove",
            LayoutMutation::SetRect { .. } => "set_rect",
            LayoutMutation::MoveTo { .. } => "move",
            LayoutMutation::Resize { .. } => "resize",
            LayoutMutation::MoveToMonitor { .. } => "move_to_monitor",
            LayoutMutation::Swap { .. } => "swap",
            LayoutMutation::Split { .. } => "split",
            LayoutMutation::Merge { .. } => "merge",
        }
    }
}

/// How a mutation affected one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementChange {
    Added(ElementId),
    Removed(ElementId),
    Updated(ElementId),
}

/// A validated configuration produced by [`LayoutConfiguration::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub configuration: LayoutConfiguration,
    pub changes: Vec<ElementChange>,
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Ordered collection of layout elements plus the monitors they live on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfiguration {
    id: Uuid,
    name: String,
    #[serde(default)]
    preset: Option<LayoutPreset>,
    monitors: Vec<Monitor>,
    #[serde(default)]
    elements: Vec<LayoutElement>,
    #[serde(default)]
    version: u64,
}

impl LayoutConfiguration {
    /// Creates a layout with monitors but no elements.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NoMonitors`] or [`LayoutError::InvalidMonitor`]
    /// if the monitor list is unusable.
    pub fn empty(name: impl Into<String>, monitors: Vec<Monitor>) -> Result<Self, LayoutError> {
        Self::from_parts(name, monitors, Vec::new())
    }

    /// Creates a layout from its parts, validating every invariant.
    pub fn from_parts(
        name: impl Into<String>,
        monitors: Vec<Monitor>,
        elements: Vec<LayoutElement>,
    ) -> Result<Self, LayoutError> {
        let config = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            preset: None,
            monitors,
            elements,
            version: 0,
        };
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn tagged(mut self, preset: LayoutPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The preset this layout was built from, until its first mutation.
    pub fn preset(&self) -> Option<LayoutPreset> {
        self.preset
    }

    /// Incremented by every applied mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn monitor(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.id == id)
    }

    /// The monitor flagged primary, or the first one described.
    pub fn primary_monitor(&self) -> Option<&Monitor> {
        self.monitors
            .iter()
            .find(|m| m.primary)
            .or_else(|| self.monitors.first())
    }

    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&LayoutElement> {
        self.elements.iter().find(|e| e.id() == id)
    }

    /// Viewport slots in reading order: monitor order, then top-to-bottom,
    /// then left-to-right.
    pub fn viewport_slots(&self) -> Vec<&ViewportSlot> {
        let mut slots: Vec<&ViewportSlot> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                LayoutElement::ViewportSlot(slot) => Some(slot),
                _ => None,
            })
            .collect();
        slots.sort_by_key(|s| {
            let monitor_index = self
                .monitors
                .iter()
                .position(|m| m.id == s.placement.monitor)
                .unwrap_or(usize::MAX);
            (monitor_index, s.placement.rect.y, s.placement.rect.x)
        });
        slots
    }

    /// Returns a copy under a new id and name, with the version reset.
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 0,
            ..self.clone()
        }
    }

    /// Checks every invariant listed in the module documentation.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.monitors.is_empty() {
            return Err(LayoutError::NoMonitors);
        }
        let mut monitor_ids = HashSet::new();
        for monitor in &self.monitors {
            if monitor.width == 0 || monitor.height == 0 || !monitor_ids.insert(monitor.id) {
                return Err(LayoutError::InvalidMonitor(monitor.id));
            }
        }

        let mut element_ids = HashSet::new();
        for element in &self.elements {
            if !element_ids.insert(element.id()) {
                return Err(LayoutError::DuplicateElement(element.id()));
            }
            self.validate_element(element)?;
        }

        for (i, a) in self.elements.iter().enumerate() {
            for b in &self.elements[i + 1..] {
                let (pa, pb) = (a.placement(), b.placement());
                if pa.monitor == pb.monitor
                    && pa.z_order == pb.z_order
                    && !(pa.stacked || pb.stacked)
                    && pa.rect.overlaps(&pb.rect)
                {
                    return Err(LayoutError::Overlap {
                        first: a.id(),
                        second: b.id(),
                        z_order: pa.z_order,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_element(&self, element: &LayoutElement) -> Result<(), LayoutError> {
        let monitor = self
            .monitor(element.monitor())
            .ok_or(LayoutError::MonitorNotFound(element.monitor()))?;
        let rect = element.rect();
        check_size(element.id(), element.constraints(), &rect)?;
        if !monitor.bounds().contains_rect(&rect) {
            return Err(LayoutError::OutOfMonitorBounds {
                element: element.id(),
                monitor: monitor.id,
            });
        }
        Ok(())
    }

    /// Applies one mutation to a copy of this layout.
    ///
    /// `self` is never modified; on success the returned configuration has
    /// its version incremented and loses its preset tag.
    ///
    /// # Errors
    ///
    /// Returns the [`LayoutError`] describing the first rule the mutated
    /// layout would break.
    pub fn apply(&self, mutation: &LayoutMutation) -> Result<MutationResult, LayoutError> {
        let mut next = self.clone();
        let changes = match next.mutate(mutation).and_then(|changes| {
            next.validate()?;
            Ok(changes)
        }) {
            Ok(changes) => changes,
            Err(e) => {
                debug!(mutation = mutation.name(), error = %e, "layout mutation rejected");
                return Err(e);
            }
        };
        next.version = self.version + 1;
        next.preset = None;
        Ok(MutationResult {
            configuration: next,
            changes,
        })
    }

    /// Continues the version sequence of `previous`, so a layout that
    /// replaces it wholesale (a preset, a restored snapshot) still reads as
    /// newer.
    pub fn succeeding(mut self, previous: &LayoutConfiguration) -> Self {
        self.version = previous.version + 1;
        self
    }

    /// Replaces the monitor set (e.g. after a display was unplugged).
    ///
    /// # Errors
    ///
    /// Fails if any element would end up on a missing monitor or outside the
    /// new bounds.
    pub fn with_monitors(&self, monitors: Vec<Monitor>) -> Result<Self, LayoutError> {
        let next = Self {
            monitors,
            version: self.version + 1,
            ..self.clone()
        };
        next.validate()?;
        Ok(next)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn index_of(&self, id: ElementId) -> Result<usize, LayoutError> {
        self.elements
            .iter()
            .position(|e| e.id() == id)
            .ok_or(LayoutError::ElementNotFound(id))
    }

    fn mutate(&mut self, mutation: &LayoutMutation) -> Result<Vec<ElementChange>, LayoutError> {
        match mutation {
            LayoutMutation::Add(element) => {
                if self.element(element.id()).is_some() {
                    return Err(LayoutError::DuplicateElement(element.id()));
                }
                self.elements.push(element.clone());
                Ok(vec![ElementChange::Added(element.id())])
            }

            LayoutMutation::Remove(id) => {
                let index = self.index_of(*id)?;
                self.elements.remove(index);
                Ok(vec![ElementChange::Removed(*id)])
            }

            LayoutMutation::SetRect { id, rect } => {
                let index = self.index_of(*id)?;
                let element = &mut self.elements[index];
                let current = element.rect();
                if (current.x, current.y) != (rect.x, rect.y) && !element.is_movable() {
                    return Err(LayoutError::NotMovable(*id));
                }
                if (current.width, current.height) != (rect.width, rect.height)
                    && !element.is_resizable()
                {
                    return Err(LayoutError::NotResizable(*id));
                }
                element.placement_mut().rect = *rect;
                Ok(vec![ElementChange::Updated(*id)])
            }

            LayoutMutation::MoveTo { id, x, y } => {
                let current = self.elements[self.index_of(*id)?].rect();
                let rect = Rect::new(*x, *y, current.width, current.height);
                self.mutate(&LayoutMutation::SetRect { id: *id, rect })
            }

            LayoutMutation::Resize { id, width, height } => {
                let current = self.elements[self.index_of(*id)?].rect();
                let rect = Rect::new(current.x, current.y, *width, *height);
                self.mutate(&LayoutMutation::SetRect { id: *id, rect })
            }

            LayoutMutation::MoveToMonitor { id, monitor } => {
                let index = self.index_of(*id)?;
                let target = self
                    .monitor(*monitor)
                    .cloned()
                    .ok_or(LayoutError::MonitorNotFound(*monitor))?;
                let element = &self.elements[index];
                if !element.is_movable() {
                    return Err(LayoutError::NotMovable(*id));
                }
                let source = self
                    .monitor(element.monitor())
                    .cloned()
                    .ok_or(LayoutError::MonitorNotFound(element.monitor()))?;
                let rect = element.rect();

                // Keep the relative position, then pull the element back
                // inside when its size would push it past the far edge.
                let x = map_proportional(source.width, target.width, rect.x)
                    .min(far_limit(target.width, rect.width))
                    .max(0);
                let y = map_proportional(source.height, target.height, rect.y)
                    .min(far_limit(target.height, rect.height))
                    .max(0);

                let placement = self.elements[index].placement_mut();
                placement.monitor = target.id;
                placement.rect = Rect::new(x, y, rect.width, rect.height);
                Ok(vec![ElementChange::Updated(*id)])
            }

            LayoutMutation::Swap { first, second } => {
                let (ia, ib) = (self.index_of(*first)?, self.index_of(*second)?);
                let (a, b) = (&self.elements[ia], &self.elements[ib]);
                if ia == ib || a.kind() != b.kind() {
                    return Err(LayoutError::Incompatible {
                        first: *first,
                        second: *second,
                        operation: "swap",
                    });
                }
                for element in [a, b] {
                    if !element.is_movable() {
                        return Err(LayoutError::NotMovable(element.id()));
                    }
                }
                let (pa, pb) = (a.placement().clone(), b.placement().clone());
                let target = self.elements[ia].placement_mut();
                target.monitor = pb.monitor;
                target.rect = pb.rect;
                let target = self.elements[ib].placement_mut();
                target.monitor = pa.monitor;
                target.rect = pa.rect;
                Ok(vec![ElementChange::Updated(*first), ElementChange::Updated(*second)])
            }

            LayoutMutation::Split {
                id,
                axis,
                at,
                new_id,
            } => {
                let index = self.index_of(*id)?;
                let LayoutElement::ViewportSlot(slot) = &self.elements[index] else {
                    return Err(LayoutError::Incompatible {
                        first: *id,
                        second: *id,
                        operation: "split",
                    });
                };
                if self.element(*new_id).is_some() {
                    return Err(LayoutError::DuplicateElement(*new_id));
                }
                let rect = slot.placement.rect;
                if *at == 0 || *at >= axis.length_of(&rect) {
                    return Err(LayoutError::SplitOutOfRange { element: *id, at: *at });
                }
                let (kept, split_off) = match axis {
                    Axis::X => (
                        Rect::new(rect.x, rect.y, *at, rect.height),
                        Rect::new(rect.x + *at as i32, rect.y, rect.width - *at, rect.height),
                    ),
                    Axis::Y => (
                        Rect::new(rect.x, rect.y, rect.width, *at),
                        Rect::new(rect.x, rect.y + *at as i32, rect.width, rect.height - *at),
                    ),
                };
                let new_slot = ViewportSlot {
                    id: *new_id,
                    placement: Placement {
                        rect: split_off,
                        ..slot.placement.clone()
                    },
                    constraints: slot.constraints,
                };
                self.elements[index].placement_mut().rect = kept;
                self.elements.insert(index + 1, new_slot.into());
                Ok(vec![ElementChange::Updated(*id), ElementChange::Added(*new_id)])
            }

            LayoutMutation::Merge { keep, absorb } => {
                let (ik, ia) = (self.index_of(*keep)?, self.index_of(*absorb)?);
                let (k, a) = (&self.elements[ik], &self.elements[ia]);
                if ik == ia
                    || k.kind() != ElementKind::ViewportSlot
                    || a.kind() != ElementKind::ViewportSlot
                {
                    return Err(LayoutError::Incompatible {
                        first: *keep,
                        second: *absorb,
                        operation: "merge",
                    });
                }
                if !mergeable(k.placement(), a.placement()) {
                    return Err(LayoutError::NotAdjacent {
                        first: *keep,
                        second: *absorb,
                    });
                }
                let union = k.rect().union(&a.rect());
                self.elements[ik].placement_mut().rect = union;
                self.elements.remove(ia);
                Ok(vec![ElementChange::Updated(*keep), ElementChange::Removed(*absorb)])
            }
        }
    }
}

/// Largest origin at which a span of `size` still ends inside `extent`.
/// Negative when it cannot fit at all.
fn far_limit(extent: u32, size: u32) -> i32 {
    let limit = i64::from(extent) - i64::from(size);
    i32::try_from(limit).unwrap_or(if limit < 0 { i32::MIN } else { i32::MAX })
}

/// Two placements can merge when they sit on the same monitor and z-order
/// and share one complete edge, so their union is again a rectangle.
pub fn mergeable(a: &Placement, b: &Placement) -> bool {
    if a.monitor != b.monitor || a.z_order != b.z_order {
        return false;
    }
    let (ra, rb) = (a.rect, b.rect);
    let side_by_side = ra.y == rb.y
        && ra.height == rb.height
        && (ra.right() == rb.x || rb.right() == ra.x);
    let stacked = ra.x == rb.x
        && ra.width == rb.width
        && (ra.bottom() == rb.y || rb.bottom() == ra.y);
    side_by_side || stacked
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Monitor {
        Monitor::new(0, 0, 0, 1920, 1080).as_primary()
    }

    fn two_slots() -> (LayoutConfiguration, ElementId, ElementId) {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 960, 1080)).unwrap();
        let b = LayoutElement::viewport_slot(MonitorId(0), Rect::new(960, 0, 960, 1080)).unwrap();
        let (ia, ib) = (a.id(), b.id());
        let config = LayoutConfiguration::from_parts("two", vec![monitor()], vec![a, b]).unwrap();
        (config, ia, ib)
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn test_viewport_slot_below_min_size_is_rejected_at_construction() {
        let result = ViewportSlot::new(MonitorId(0), Rect::new(0, 0, 10, 10));
        assert!(matches!(
            result,
            Err(LayoutError::ConstraintViolated {
                constraint: Constraint::MinWidth { min: 160, actual: 10 },
                ..
            })
        ));
    }

    #[test]
    fn test_empty_layout_requires_a_monitor() {
        assert_eq!(
            LayoutConfiguration::empty("none", vec![]).unwrap_err(),
            LayoutError::NoMonitors
        );
    }

    #[test]
    fn test_duplicate_monitor_ids_are_rejected() {
        let result = LayoutConfiguration::empty(
            "dup",
            vec![Monitor::new(1, 0, 0, 800, 600), Monitor::new(1, 800, 0, 800, 600)],
        );
        assert_eq!(result.unwrap_err(), LayoutError::InvalidMonitor(MonitorId(1)));
    }

    #[test]
    fn test_overlapping_elements_at_same_z_order_are_rejected() {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 500, 500)).unwrap();
        let b = LayoutElement::viewport_slot(MonitorId(0), Rect::new(250, 250, 500, 500)).unwrap();
        let result = LayoutConfiguration::from_parts("overlap", vec![monitor()], vec![a, b]);
        assert!(matches!(result, Err(LayoutError::Overlap { z_order: 0, .. })));
    }

    #[test]
    fn test_stacked_element_may_overlap() {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 500, 500)).unwrap();
        let b = LayoutElement::panel(MonitorId(0), Rect::new(250, 250, 300, 300), "overlay")
            .unwrap()
            .stacked();
        assert!(LayoutConfiguration::from_parts("stacked", vec![monitor()], vec![a, b]).is_ok());
    }

    #[test]
    fn test_different_z_orders_may_overlap() {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 500, 500)).unwrap();
        let b = LayoutElement::toolbar(MonitorId(0), Rect::new(0, 0, 500, 40), Orientation::Horizontal)
            .unwrap()
            .with_z_order(1);
        assert!(LayoutConfiguration::from_parts("z", vec![monitor()], vec![a, b]).is_ok());
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    #[test]
    fn test_add_beyond_monitor_bounds_is_rejected_and_layout_unchanged() {
        // Arrange
        let (config, _, _) = two_slots();
        let before = config.clone();
        let wide = LayoutElement::panel(MonitorId(0), Rect::new(1900, 0, 200, 200), "p")
            .unwrap()
            .with_z_order(2);

        // Act
        let result = config.apply(&LayoutMutation::Add(wide));

        // Assert
        assert!(matches!(result, Err(LayoutError::OutOfMonitorBounds { .. })));
        assert_eq!(config, before);
    }

    #[test]
    fn test_resize_below_minimum_reports_failed_constraint() {
        let (config, a, _) = two_slots();
        let err = config
            .apply(&LayoutMutation::Resize { id: a, width: 100, height: 1080 })
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::ConstraintViolated {
                element: a,
                constraint: Constraint::MinWidth { min: 160, actual: 100 },
            }
        );
    }

    #[test]
    fn test_successful_mutation_bumps_version_and_drops_preset() {
        let (config, a, _) = two_slots();
        let result = config
            .apply(&LayoutMutation::Resize { id: a, width: 800, height: 1080 })
            .unwrap();
        assert_eq!(result.configuration.version(), config.version() + 1);
        assert_eq!(result.configuration.element(a).unwrap().rect().width, 800);
        assert_eq!(result.changes, vec![ElementChange::Updated(a)]);
    }

    #[test]
    fn test_fixed_panel_cannot_move() {
        let panel: LayoutElement = Panel::new(MonitorId(0), Rect::new(0, 1000, 1920, 80), "status")
            .unwrap()
            .fixed()
            .into();
        let id = panel.id();
        let config = LayoutConfiguration::from_parts("p", vec![monitor()], vec![panel]).unwrap();
        assert_eq!(
            config.apply(&LayoutMutation::MoveTo { id, x: 0, y: 900 }).unwrap_err(),
            LayoutError::NotMovable(id)
        );
    }

    #[test]
    fn test_swap_exchanges_rectangles() {
        let (config, a, b) = two_slots();
        let next = config
            .apply(&LayoutMutation::Swap { first: a, second: b })
            .unwrap()
            .configuration;
        assert_eq!(next.element(a).unwrap().rect(), Rect::new(960, 0, 960, 1080));
        assert_eq!(next.element(b).unwrap().rect(), Rect::new(0, 0, 960, 1080));
    }

    #[test]
    fn test_swap_rejects_different_kinds() {
        let slot = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 960, 1000)).unwrap();
        let panel = LayoutElement::panel(MonitorId(0), Rect::new(960, 0, 960, 1000), "p").unwrap();
        let (s, p) = (slot.id(), panel.id());
        let config = LayoutConfiguration::from_parts("k", vec![monitor()], vec![slot, panel]).unwrap();
        assert!(matches!(
            config.apply(&LayoutMutation::Swap { first: s, second: p }),
            Err(LayoutError::Incompatible { operation: "swap", .. })
        ));
    }

    #[test]
    fn test_split_then_merge_restores_geometry() {
        // Arrange
        let (config, a, _) = two_slots();

        // Act
        let split = config.apply(&LayoutMutation::split(a, Axis::Y, 540)).unwrap();
        let new_id = match split.changes[1] {
            ElementChange::Added(id) => id,
            other => panic!("unexpected change {other:?}"),
        };
        let merged = split
            .configuration
            .apply(&LayoutMutation::Merge { keep: a, absorb: new_id })
            .unwrap();

        // Assert
        assert_eq!(split.configuration.element(a).unwrap().rect(), Rect::new(0, 0, 960, 540));
        assert_eq!(split.configuration.element(new_id).unwrap().rect(), Rect::new(0, 540, 960, 540));
        assert_eq!(merged.configuration.element(a).unwrap().rect(), Rect::new(0, 0, 960, 1080));
        assert!(merged.configuration.element(new_id).is_none());
    }

    #[test]
    fn test_split_at_edge_is_out_of_range() {
        let (config, a, _) = two_slots();
        assert_eq!(
            config.apply(&LayoutMutation::split(a, Axis::X, 960)).unwrap_err(),
            LayoutError::SplitOutOfRange { element: a, at: 960 }
        );
    }

    #[test]
    fn test_merge_requires_full_shared_edge() {
        let a = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 500, 500)).unwrap();
        let b = LayoutElement::viewport_slot(MonitorId(0), Rect::new(500, 0, 500, 400)).unwrap();
        let (ia, ib) = (a.id(), b.id());
        let config = LayoutConfiguration::from_parts("m", vec![monitor()], vec![a, b]).unwrap();
        assert_eq!(
            config.apply(&LayoutMutation::Merge { keep: ia, absorb: ib }).unwrap_err(),
            LayoutError::NotAdjacent { first: ia, second: ib }
        );
    }

    #[test]
    fn test_move_to_monitor_recomputes_rect_relative_to_target() {
        // Arrange: 1920x1080 primary, 1280x1024 secondary to its right
        let slot = LayoutElement::viewport_slot(MonitorId(0), Rect::new(960, 540, 400, 300)).unwrap();
        let id = slot.id();
        let config = LayoutConfiguration::from_parts(
            "multi",
            vec![monitor(), Monitor::new(1, 1920, 0, 1280, 1024)],
            vec![slot],
        )
        .unwrap();

        // Act
        let next = config
            .apply(&LayoutMutation::MoveToMonitor { id, monitor: MonitorId(1) })
            .unwrap()
            .configuration;

        // Assert
        let moved = next.element(id).unwrap();
        assert_eq!(moved.monitor(), MonitorId(1));
        assert_eq!(moved.rect(), Rect::new(640, 512, 400, 300));
    }

    #[test]
    fn test_move_to_smaller_monitor_pulls_element_inside() {
        let slot = LayoutElement::viewport_slot(MonitorId(0), Rect::new(1500, 0, 400, 300)).unwrap();
        let id = slot.id();
        let config = LayoutConfiguration::from_parts(
            "multi",
            vec![monitor(), Monitor::new(1, 1920, 0, 800, 600)],
            vec![slot],
        )
        .unwrap();
        let next = config
            .apply(&LayoutMutation::MoveToMonitor { id, monitor: MonitorId(1) })
            .unwrap()
            .configuration;
        assert_eq!(next.element(id).unwrap().rect().right(), 800);
    }

    #[test]
    fn test_far_limit_does_not_wrap_for_huge_extents() {
        assert_eq!(far_limit(800, 400), 400);
        assert_eq!(far_limit(400, 800), -400);
        assert_eq!(far_limit(u32::MAX, 10), i32::MAX);
        assert_eq!(far_limit(3_000_000_000, 400), i32::MAX);
        assert_eq!(far_limit(10, u32::MAX), i32::MIN);
    }

    #[test]
    fn test_move_to_monitor_too_small_for_element_is_rejected() {
        let slot = LayoutElement::viewport_slot(MonitorId(0), Rect::new(0, 0, 1000, 300)).unwrap();
        let id = slot.id();
        let config = LayoutConfiguration::from_parts(
            "multi",
            vec![monitor(), Monitor::new(1, 1920, 0, 800, 600)],
            vec![slot],
        )
        .unwrap();

        let result = config.apply(&LayoutMutation::MoveToMonitor { id, monitor: MonitorId(1) });

        assert!(matches!(result, Err(LayoutError::OutOfMonitorBounds { .. })));
    }

    #[test]
    fn test_remove_unknown_element_fails() {
        let (config, _, _) = two_slots();
        let unknown = Uuid::new_v4();
        assert_eq!(
            config.apply(&LayoutMutation::Remove(unknown)).unwrap_err(),
            LayoutError::ElementNotFound(unknown)
        );
    }

    #[test]
    fn test_with_monitors_rejects_shrinking_below_elements() {
        let (config, _, _) = two_slots();
        let result = config.with_monitors(vec![Monitor::new(0, 0, 0, 1280, 1024)]);
        assert!(matches!(result, Err(LayoutError::OutOfMonitorBounds { .. })));
    }

    #[test]
    fn test_viewport_slots_are_in_reading_order() {
        let (config, a, b) = two_slots();
        let swapped = config
            .apply(&LayoutMutation::Swap { first: a, second: b })
            .unwrap()
            .configuration;
        let ids: Vec<_> = swapped.viewport_slots().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
    }
}
