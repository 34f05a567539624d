//! Per-region display state machine and manipulation math.
//!
//! ```text
//!            bind()                success
//!   EMPTY ───────────▶ LOADING ───────────▶ DISPLAYED
//!     ▲                  │  ▲                   │
//!     │         failure  ▼  │ bind()            │
//!     │                ERROR ───────────────────┤
//!     └──────────────── clear() ◀───────────────┘
//! ```
//!
//! A [`Viewport`] never performs I/O.  The application layer drives it with
//! [`LoadTicket`]s: every `begin_load` (and every `clear`) starts a new
//! generation, and results carrying an older ticket are reported as
//! [`LoadOutcome::Stale`] and dropped.  That is how a late fetch for an
//! image the user already navigated away from can never overwrite the
//! current display.
//!
//! While a higher tier is still in flight the viewport may already show a
//! lower-tier placeholder.  It then reports `DISPLAYED` and keeps the
//! pending tier; the final buffer replaces the placeholder, but a lower tier
//! never replaces a higher one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::image::{FetchError, ImageBuffer, ImageReference, QualityTier, WindowLevel};
use super::layout::ElementId;

/// A viewport is identified by the viewport slot that hosts it.
pub type ViewportId = ElementId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewportState {
    Empty,
    Loading,
    Displayed,
    /// Fetch failed; left only through `clear()` or a new `bind()`.
    Error(FetchError),
}

impl ViewportState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewportState::Empty => "empty",
            ViewportState::Loading => "loading",
            ViewportState::Displayed => "displayed",
            ViewportState::Error(_) => "error",
        }
    }
}

/// Limits applied to manipulations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportPolicy {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Factor applied by one `zoom_in` / `zoom_out` step.
    pub zoom_step: f64,
    /// Degrees per fixed rotation step.
    pub rotation_step: f64,
    /// Pixels of the image that must stay inside the frame when panning.
    pub min_visible_px: u32,
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 20.0,
            zoom_step: 1.25,
            rotation_step: 90.0,
            min_visible_px: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotation {
    /// A number of fixed steps (negative = counter-clockwise).
    Steps(i32),
    /// An arbitrary angle in degrees.
    Degrees(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// View transform of a displayed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Manipulation {
    pub zoom: f64,
    /// Offset of the image centre from the frame centre, in screen pixels.
    pub pan_x: f64,
    pub pan_y: f64,
    /// Clockwise rotation in degrees, normalised to `[0, 360)`.
    pub rotation: f64,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub window: WindowLevel,
}

impl Manipulation {
    pub fn identity(window: WindowLevel) -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            rotation: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
            window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ManipulationError {
    #[error("viewport is not displaying an image")]
    NotDisplayed,
}

/// Proof that a load was started; results must present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    tier: QualityTier,
}

impl LoadTicket {
    pub fn tier(&self) -> QualityTier {
        self.tier
    }
}

/// What happened to a buffer handed to the viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The buffer is now shown; `replaced` was shown before it.
    Shown { replaced: Option<ImageBuffer> },
    /// An equal or higher tier of the same image is already shown.
    Ignored,
    /// The ticket belongs to a superseded load.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    id: ViewportId,
    state: ViewportState,
    reference: Option<ImageReference>,
    displayed: Option<ImageBuffer>,
    pending: Option<LoadTicket>,
    manipulation: Manipulation,
    /// Image the manipulation state was set up for.
    manipulated: Option<ImageReference>,
    frame: (u32, u32),
    policy: ViewportPolicy,
    generation: u64,
}

impl Viewport {
    pub fn new(id: ViewportId, frame_width: u32, frame_height: u32, policy: ViewportPolicy) -> Self {
        Self {
            id,
            state: ViewportState::Empty,
            reference: None,
            displayed: None,
            pending: None,
            manipulation: Manipulation::identity(WindowLevel {
                center: 127.5,
                width: 255.0,
            }),
            manipulated: None,
            frame: (frame_width, frame_height),
            policy,
            generation: 0,
        }
    }

    pub fn id(&self) -> ViewportId {
        self.id
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    /// The image this viewport is bound to, if any.
    pub fn reference(&self) -> Option<&ImageReference> {
        self.reference.as_ref()
    }

    /// The buffer on screen (possibly a lower-tier placeholder).
    pub fn displayed(&self) -> Option<&ImageBuffer> {
        match self.state {
            ViewportState::Displayed => self.displayed.as_ref(),
            _ => None,
        }
    }

    pub fn displayed_tier(&self) -> Option<QualityTier> {
        self.displayed().map(ImageBuffer::tier)
    }

    /// Tier still being fetched, if any.
    pub fn pending_tier(&self) -> Option<QualityTier> {
        self.pending.map(|t| t.tier)
    }

    /// Manipulation state; only meaningful while displayed.
    pub fn manipulation(&self) -> Option<&Manipulation> {
        match self.state {
            ViewportState::Displayed => Some(&self.manipulation),
            _ => None,
        }
    }

    pub fn frame(&self) -> (u32, u32) {
        self.frame
    }

    pub fn policy(&self) -> &ViewportPolicy {
        &self.policy
    }

    /// Returns `true` if binding `(reference, tier)` would change nothing:
    /// that image is displayed at `tier` or better, or `tier` is already in
    /// flight behind a placeholder.
    pub fn satisfies(&self, reference: &ImageReference, tier: QualityTier) -> bool {
        self.state == ViewportState::Displayed
            && self.reference.as_ref() == Some(reference)
            && (self.displayed_tier().is_some_and(|t| t >= tier)
                || self.pending_tier().is_some_and(|t| t >= tier))
    }

    /// Resizes the frame (the hosting slot changed geometry).
    pub fn set_frame(&mut self, width: u32, height: u32) {
        self.frame = (width, height);
        self.clamp_pan();
    }

    /// Moves this viewport's content to another slot after a layout switch.
    /// Outstanding tickets stay valid.
    pub fn rehost(&mut self, id: ViewportId, frame_width: u32, frame_height: u32) {
        self.id = id;
        self.set_frame(frame_width, frame_height);
    }

    // ── State machine ─────────────────────────────────────────────────────────

    /// Starts loading `reference` at `tier`, superseding any earlier load.
    ///
    /// Returns the ticket for the new load and the buffer that is no longer
    /// displayed, if any.
    pub fn begin_load(
        &mut self,
        reference: ImageReference,
        tier: QualityTier,
    ) -> (LoadTicket, Option<ImageBuffer>) {
        self.generation += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            tier,
        };
        let released = self.displayed.take();
        if self.manipulated.as_ref() != Some(&reference) {
            self.manipulated = None;
        }
        self.reference = Some(reference);
        self.pending = Some(ticket);
        self.state = ViewportState::Loading;
        (ticket, released)
    }

    /// Shows a lower-tier buffer while the ticket's tier is still loading.
    pub fn show_placeholder(&mut self, ticket: LoadTicket, buffer: ImageBuffer) -> LoadOutcome {
        if !self.is_current(ticket) || buffer.tier() >= ticket.tier {
            return LoadOutcome::Stale;
        }
        self.show(buffer)
    }

    /// Delivers the buffer the ticket asked for.  Clears the pending load.
    pub fn complete_load(&mut self, ticket: LoadTicket, buffer: ImageBuffer) -> LoadOutcome {
        if !self.is_current(ticket) {
            return LoadOutcome::Stale;
        }
        self.pending = None;
        self.show(buffer)
    }

    /// Records a failed fetch.
    ///
    /// With a placeholder on screen the viewport stays `DISPLAYED` at the
    /// lower tier; otherwise it enters `ERROR`.  Returns `false` for stale
    /// tickets.
    pub fn fail_load(&mut self, ticket: LoadTicket, error: FetchError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.pending = None;
        if self.state != ViewportState::Displayed {
            self.state = ViewportState::Error(error);
        }
        true
    }

    /// Abandons the pending load without touching what is displayed.
    pub fn abandon_load(&mut self, ticket: LoadTicket) {
        if self.is_current(ticket) {
            self.pending = None;
            if self.state == ViewportState::Loading {
                self.state = ViewportState::Empty;
                self.reference = None;
            }
        }
    }

    /// Returns to `EMPTY` and invalidates every outstanding ticket.
    pub fn clear(&mut self) -> Option<ImageBuffer> {
        self.generation += 1;
        self.pending = None;
        self.reference = None;
        self.manipulated = None;
        self.state = ViewportState::Empty;
        self.displayed.take()
    }

    fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    fn show(&mut self, buffer: ImageBuffer) -> LoadOutcome {
        if let Some(current) = self.displayed.as_ref() {
            if current.reference() == buffer.reference() && current.tier() >= buffer.tier() {
                return LoadOutcome::Ignored;
            }
        }
        // A tier upgrade of the same image keeps zoom, pan and window/level.
        if self.manipulated.as_ref() != Some(buffer.reference()) {
            self.manipulation = Manipulation::identity(buffer.default_window());
            self.manipulated = Some(buffer.reference().clone());
        }
        let replaced = self.displayed.replace(buffer);
        self.state = ViewportState::Displayed;
        self.clamp_pan();
        LoadOutcome::Shown { replaced }
    }

    // ── Manipulations ─────────────────────────────────────────────────────────

    /// Multiplies the zoom factor, clamped to the policy range.
    pub fn zoom_by(&mut self, factor: f64) -> Result<f64, ManipulationError> {
        let current = self.displayed_manipulation()?.zoom;
        self.zoom_to(current * factor)
    }

    pub fn zoom_to(&mut self, zoom: f64) -> Result<f64, ManipulationError> {
        let policy = self.policy;
        let m = self.displayed_manipulation_mut()?;
        let zoom = if zoom.is_finite() { zoom } else { m.zoom };
        m.zoom = zoom.clamp(policy.min_zoom, policy.max_zoom);
        let zoom = m.zoom;
        self.clamp_pan();
        Ok(zoom)
    }

    pub fn zoom_in(&mut self) -> Result<f64, ManipulationError> {
        self.zoom_by(self.policy.zoom_step)
    }

    pub fn zoom_out(&mut self) -> Result<f64, ManipulationError> {
        self.zoom_by(1.0 / self.policy.zoom_step)
    }

    /// Pans by a screen-pixel delta; the image always stays partly visible.
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> Result<(f64, f64), ManipulationError> {
        let m = self.displayed_manipulation_mut()?;
        m.pan_x += dx;
        m.pan_y += dy;
        self.clamp_pan();
        Ok((self.manipulation.pan_x, self.manipulation.pan_y))
    }

    pub fn rotate(&mut self, rotation: Rotation) -> Result<f64, ManipulationError> {
        let policy = self.policy;
        let m = self.displayed_manipulation_mut()?;
        let degrees = match rotation {
            Rotation::Steps(steps) => f64::from(steps) * policy.rotation_step,
            Rotation::Degrees(degrees) if degrees.is_finite() => degrees,
            Rotation::Degrees(_) => 0.0,
        };
        m.rotation = (m.rotation + degrees).rem_euclid(360.0);
        let rotation = m.rotation;
        self.clamp_pan();
        Ok(rotation)
    }

    /// Toggles a flip.
    pub fn flip(&mut self, axis: FlipAxis) -> Result<(), ManipulationError> {
        let m = self.displayed_manipulation_mut()?;
        match axis {
            FlipAxis::Horizontal => m.flip_horizontal = !m.flip_horizontal,
            FlipAxis::Vertical => m.flip_vertical = !m.flip_vertical,
        }
        Ok(())
    }

    /// Sets window/level, clamped to the displayed image's value range.
    pub fn set_window_level(&mut self, window: WindowLevel) -> Result<WindowLevel, ManipulationError> {
        let (lo, hi) = self
            .displayed()
            .map(ImageBuffer::value_range)
            .ok_or(ManipulationError::NotDisplayed)?;
        let max_width = (hi - lo).max(1.0);
        let center = if window.center.is_finite() { window.center } else { (lo + hi) / 2.0 };
        let width = if window.width.is_finite() { window.width } else { max_width };
        let clamped = WindowLevel {
            center: center.clamp(lo, hi),
            width: width.clamp(1.0, max_width),
        };
        self.manipulation.window = clamped;
        Ok(clamped)
    }

    /// Shifts window/level by a delta (e.g. from a mouse drag).
    pub fn adjust_window_level(&mut self, d_center: f64, d_width: f64) -> Result<WindowLevel, ManipulationError> {
        let current = self.displayed_manipulation()?.window;
        self.set_window_level(WindowLevel {
            center: current.center + d_center,
            width: current.width + d_width,
        })
    }

    /// Back to zoom 1, no pan/rotation/flip and the image's default window.
    pub fn reset(&mut self) -> Result<(), ManipulationError> {
        let window = self
            .displayed()
            .map(ImageBuffer::default_window)
            .ok_or(ManipulationError::NotDisplayed)?;
        self.manipulation = Manipulation::identity(window);
        Ok(())
    }

    fn displayed_manipulation(&self) -> Result<&Manipulation, ManipulationError> {
        self.manipulation().ok_or(ManipulationError::NotDisplayed)
    }

    fn displayed_manipulation_mut(&mut self) -> Result<&mut Manipulation, ManipulationError> {
        match self.state {
            ViewportState::Displayed => Ok(&mut self.manipulation),
            _ => Err(ManipulationError::NotDisplayed),
        }
    }

    /// Limits the pan so at least `min_visible_px` of the image overlaps the
    /// frame on each axis.
    fn clamp_pan(&mut self) {
        let Some(buffer) = self.displayed.as_ref() else {
            return;
        };
        let m = &mut self.manipulation;
        let (image_w, image_h) = rotated_extent(
            f64::from(buffer.width()) * m.zoom,
            f64::from(buffer.height()) * m.zoom,
            m.rotation,
        );
        let (frame_w, frame_h) = (f64::from(self.frame.0), f64::from(self.frame.1));
        let min_visible = f64::from(self.policy.min_visible_px);
        m.pan_x = clamp_axis(m.pan_x, frame_w, image_w, min_visible);
        m.pan_y = clamp_axis(m.pan_y, frame_h, image_h, min_visible);
    }
}

fn rotated_extent(width: f64, height: f64, degrees: f64) -> (f64, f64) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    (width * cos + height * sin, width * sin + height * cos)
}

fn clamp_axis(pan: f64, frame: f64, image: f64, min_visible: f64) -> f64 {
    let visible = min_visible.min(frame).min(image);
    let limit = ((frame + image) / 2.0 - visible).max(0.0);
    if pan.is_finite() {
        pan.clamp(-limit, limit)
    } else {
        0.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
