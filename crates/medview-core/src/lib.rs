//! # medview-core
//!
//! Domain library for the medview display engine: the geometry of screen
//! layouts spanning one or more monitors, the rules that keep those layouts
//! valid, the snapping math used while dragging regions around, and the
//! state machine of the viewports that display medical images.
//!
//! # Architecture overview (for beginners)
//!
//! A radiology workstation shows many images at once, often across two or
//! three monitors.  The screen is divided into *regions*: viewport slots
//! that display an image, toolbars and panels.  The user can rearrange the
//! regions by dragging, and each viewport loads its image progressively
//! (thumbnail, then preview, then full resolution).
//!
//! This crate (`medview-core`) holds the rules and nothing else:
//!
//! - **`domain::layout`** – `LayoutConfiguration`, a validated value that
//!   changes only through `apply(LayoutMutation)`.  A rejected mutation leaves
//!   the original untouched.
//! - **`domain::preset`** – the single, dual and quad starting geometries.
//! - **`domain::snap`** – grid, element-edge and monitor-edge snapping.
//! - **`domain::viewport`** – the `EMPTY → LOADING → DISPLAYED` state machine
//!   plus zoom, pan, rotation, flip and window/level.
//! - **`domain::image`** – image references, quality tiers and buffers.
//!
//! The `medview-engine` crate adds the asynchronous parts: the image loader
//! and cache, the managers that own the live state, and persistence.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `medview_core::LayoutConfiguration` instead of the full module path.
pub use domain::geometry::{Axis, Edge, Point, Rect};
pub use domain::image::{CacheKey, FetchError, ImageBuffer, ImageReference, QualityTier, SeriesId, WindowLevel};
pub use domain::layout::{
    Constraint, ElementChange, ElementId, ElementKind, LayoutConfiguration, LayoutElement, LayoutError,
    LayoutMutation, Monitor, MonitorId, MutationResult, Orientation, Panel, Placement, SizeConstraints, Toolbar,
    ViewportSlot,
};
pub use domain::preset::LayoutPreset;
pub use domain::snap::{ResizeHandle, SnapContext, SnapGuide, SnapModes, SnapResult, SnapSettings, SnapSource};
pub use domain::snapshot::{LayoutSnapshot, SnapshotError};
pub use domain::viewport::{
    FlipAxis, LoadOutcome, LoadTicket, Manipulation, ManipulationError, Rotation, Viewport, ViewportId,
    ViewportPolicy, ViewportState,
};
