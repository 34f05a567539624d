//! ViewportManager: the live viewports of the current layout.
//!
//! Each viewport slot in the authoritative layout hosts one [`Viewport`]
//! (see `medview_core::domain::viewport` for the state machine).  This
//! manager owns them, binds images to them through the [`ImageLoader`],
//! pins what they display and keeps the viewport set in step with layout
//! changes.
//!
//! # Binding an image (for beginners)
//!
//! ```text
//! bind(ref, tier)
//!   ├─ already showing (ref, tier or better)? ─► AlreadyDisplayed, no fetch
//!   ├─ cancel this viewport's previous load
//!   ├─ LOADING; ask the loader
//!   │    ├─ resident ────────────────────────► DISPLAYED
//!   │    └─ pending (+ lower-tier placeholder shown right away)
//!   └─ wait, racing the cancel signal
//!        ├─ buffer ──► DISPLAYED, pin it, unpin what it replaced
//!        ├─ error  ──► ERROR (or stay on the placeholder) + error to caller
//!        └─ cancelled by clear()/bind() ──► Superseded
//! ```
//!
//! The table lock is a `parking_lot::Mutex` and is never held across an
//! `.await`.  Lock order is always table first, then the loader's internal
//! lock.

use std::collections::HashMap;
use std::sync::Arc;

use medview_core::{
    CacheKey, ElementChange, FetchError, FlipAxis, ImageBuffer, ImageReference, LayoutConfiguration, LoadOutcome,
    Manipulation, ManipulationError, QualityTier, Rotation, Viewport, ViewportId, ViewportPolicy, ViewportState,
    WindowLevel,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::image_loader::{ImageLoader, LoadError, LoadRequest};
use super::layout_manager::LayoutListener;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewportError {
    #[error("viewport not found: {0}")]
    NotFound(ViewportId),

    #[error("no viewport is active")]
    NoActiveViewport,

    #[error(transparent)]
    Manipulation(#[from] ManipulationError),

    #[error("image load failed: {0}")]
    Load(#[from] LoadError),

    /// A later `bind()` or `clear()` on the same viewport took over.
    #[error("load was superseded")]
    Superseded,

    #[error("viewport is not bound to a series")]
    NoSeries,

    #[error("frame index {index} is outside a series of {len} frames")]
    OutOfSeries { index: i64, len: usize },
}

impl ViewportError {
    /// The image-source failure behind this error, if that is what it is.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            ViewportError::Load(LoadError::Fetch(e)) => Some(e),
            _ => None,
        }
    }
}

/// Successful outcome of a bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The viewport now shows the image at this tier.
    Displayed(QualityTier),
    /// The viewport already showed (or was fetching) the image at that tier.
    AlreadyDisplayed,
}

#[derive(Debug, Clone)]
struct SeriesContext {
    frames: Arc<[ImageReference]>,
    index: usize,
}

struct Slot {
    viewport: Viewport,
    /// Signalled to abandon the in-flight load.  Doubles as the identity of
    /// that load, since the viewport id can change while it is pending.
    cancel: Option<Arc<Notify>>,
    series: Option<SeriesContext>,
    /// Cache entry pinned on behalf of what is displayed.
    pinned: Option<CacheKey>,
    /// Prefetch scope; survives a remap to another slot id.
    scope: Uuid,
}

impl Slot {
    fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            cancel: None,
            series: None,
            pinned: None,
            scope: Uuid::new_v4(),
        }
    }
}

#[derive(Default)]
struct Table {
    slots: HashMap<ViewportId, Slot>,
    /// Viewport ids in layout reading order.
    order: Vec<ViewportId>,
    active: Option<ViewportId>,
}

impl Table {
    fn resolve(&self, target: Option<ViewportId>) -> Result<ViewportId, ViewportError> {
        let id = match target {
            Some(id) => id,
            None => self.active.ok_or(ViewportError::NoActiveViewport)?,
        };
        if self.slots.contains_key(&id) {
            Ok(id)
        } else {
            Err(ViewportError::NotFound(id))
        }
    }

    fn slot_mut(&mut self, target: Option<ViewportId>) -> Result<&mut Slot, ViewportError> {
        let id = self.resolve(target)?;
        self.slots.get_mut(&id).ok_or(ViewportError::NotFound(id))
    }

    /// The slot whose in-flight load is identified by `cancel`.
    fn slot_for_load(&mut self, cancel: &Arc<Notify>) -> Option<&mut Slot> {
        self.slots
            .values_mut()
            .find(|slot| slot.cancel.as_ref().is_some_and(|c| Arc::ptr_eq(c, cancel)))
    }
}

pub struct ViewportManager {
    loader: Arc<ImageLoader>,
    policy: ViewportPolicy,
    table: Mutex<Table>,
}

impl ViewportManager {
    /// Creates the manager with one viewport per slot of `layout`.
    pub fn new(loader: Arc<ImageLoader>, policy: ViewportPolicy, layout: &LayoutConfiguration) -> Self {
        let manager = Self {
            loader,
            policy,
            table: Mutex::new(Table::default()),
        };
        manager.sync_with_layout(layout);
        manager
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Viewport ids in layout reading order.
    pub fn viewport_ids(&self) -> Vec<ViewportId> {
        self.table.lock().order.clone()
    }

    /// A copy of one viewport's current state.
    pub fn viewport(&self, id: ViewportId) -> Option<Viewport> {
        self.table.lock().slots.get(&id).map(|slot| slot.viewport.clone())
    }

    pub fn state(&self, id: ViewportId) -> Option<ViewportState> {
        self.table.lock().slots.get(&id).map(|slot| slot.viewport.state().clone())
    }

    pub fn displayed(&self, id: ViewportId) -> Option<ImageBuffer> {
        self.table
            .lock()
            .slots
            .get(&id)
            .and_then(|slot| slot.viewport.displayed().cloned())
    }

    pub fn active(&self) -> Option<ViewportId> {
        self.table.lock().active
    }

    /// Makes `id` the target of untargeted operations.  No viewport content
    /// changes.
    pub fn set_active(&self, id: ViewportId) -> Result<(), ViewportError> {
        let mut table = self.table.lock();
        table.resolve(Some(id))?;
        table.active = Some(id);
        trace!(viewport = %id, "active viewport changed");
        Ok(())
    }

    // ── Binding ───────────────────────────────────────────────────────────────

    /// Binds `reference` at `tier` to `target` (or the active viewport) and
    /// waits until it is displayed.
    ///
    /// # Errors
    ///
    /// - [`ViewportError::Load`] when the fetch failed; the viewport is then
    ///   in `ERROR` (or still on its lower-tier placeholder).
    /// - [`ViewportError::Superseded`] when a later `bind()` or `clear()` on
    ///   the same viewport cancelled this one.
    pub async fn bind(
        &self,
        target: Option<ViewportId>,
        reference: ImageReference,
        tier: QualityTier,
    ) -> Result<BindOutcome, ViewportError> {
        self.bind_with(target, reference, tier, None).await
    }

    /// Binds `frames[index]` and schedules prefetch of its neighbours.
    pub async fn bind_in_series(
        &self,
        target: Option<ViewportId>,
        frames: impl Into<Arc<[ImageReference]>>,
        index: usize,
        tier: QualityTier,
    ) -> Result<BindOutcome, ViewportError> {
        let frames = frames.into();
        let reference = frames.get(index).cloned().ok_or(ViewportError::OutOfSeries {
            index: index as i64,
            len: frames.len(),
        })?;
        self.bind_with(target, reference, tier, Some(SeriesContext { frames, index }))
            .await
    }

    /// Moves `delta` frames through the viewport's series.
    pub async fn step(
        &self,
        target: Option<ViewportId>,
        delta: i64,
        tier: QualityTier,
    ) -> Result<BindOutcome, ViewportError> {
        let (id, series) = {
            let mut table = self.table.lock();
            let id = table.resolve(target)?;
            let slot = table.slot_mut(Some(id))?;
            (id, slot.series.clone().ok_or(ViewportError::NoSeries)?)
        };
        let index = series.index as i64 + delta;
        if index < 0 || index >= series.frames.len() as i64 {
            return Err(ViewportError::OutOfSeries {
                index,
                len: series.frames.len(),
            });
        }
        self.bind_in_series(Some(id), series.frames, index as usize, tier)
            .await
    }

    async fn bind_with(
        &self,
        target: Option<ViewportId>,
        reference: ImageReference,
        tier: QualityTier,
        series: Option<SeriesContext>,
    ) -> Result<BindOutcome, ViewportError> {
        let (id, ticket, cancel, pending) = {
            let mut table = self.table.lock();
            let id = table.resolve(target)?;
            let slot = table.slot_mut(Some(id))?;

            if slot.viewport.satisfies(&reference, tier) {
                if let Some(series) = series {
                    self.loader.prefetch(slot.scope, &series.frames, series.index);
                    slot.series = Some(series);
                }
                debug!(viewport = %id, %reference, %tier, "bind is a no-op");
                return Ok(BindOutcome::AlreadyDisplayed);
            }

            if let Some(previous) = slot.cancel.take() {
                previous.notify_one();
            }
            let (ticket, _released) = slot.viewport.begin_load(reference.clone(), tier);
            if let Some(key) = slot.pinned.take() {
                self.loader.unpin(&key);
            }
            debug!(viewport = %id, %reference, %tier, "bind started");

            let request = match self.loader.request(&reference, tier) {
                Ok(request) => request,
                Err(e) => {
                    slot.viewport.abandon_load(ticket);
                    return Err(ViewportError::Load(e));
                }
            };

            match &series {
                Some(series) => {
                    self.loader.prefetch(slot.scope, &series.frames, series.index);
                }
                None if slot.series.is_some() => self.loader.cancel_prefetch(slot.scope),
                None => {}
            }
            slot.series = series;

            match request {
                LoadRequest::Ready(buffer) => {
                    slot.viewport.complete_load(ticket, buffer.clone());
                    self.pin(slot, &buffer);
                    info!(viewport = %id, %reference, %tier, "image displayed from cache");
                    return Ok(BindOutcome::Displayed(tier));
                }
                LoadRequest::Pending { placeholder, pending } => {
                    if let Some(placeholder) = placeholder {
                        if let LoadOutcome::Shown { .. } = slot.viewport.show_placeholder(ticket, placeholder.clone()) {
                            trace!(viewport = %id, tier = %placeholder.tier(), "placeholder shown");
                            self.pin(slot, &placeholder);
                        }
                    }
                    let cancel = Arc::new(Notify::new());
                    slot.cancel = Some(Arc::clone(&cancel));
                    (id, ticket, cancel, pending)
                }
            }
        };

        let result = tokio::select! {
            result = pending.wait() => Some(result),
            _ = cancel.notified() => None,
        };

        let mut table = self.table.lock();
        let Some(slot) = table.slot_for_load(&cancel) else {
            debug!(viewport = %id, "bind superseded");
            return Err(ViewportError::Superseded);
        };
        slot.cancel = None;
        let current_id = slot.viewport.id();

        match result {
            None => {
                slot.viewport.abandon_load(ticket);
                Err(ViewportError::Superseded)
            }
            Some(Ok(buffer)) => match slot.viewport.complete_load(ticket, buffer.clone()) {
                LoadOutcome::Shown { .. } => {
                    self.pin(slot, &buffer);
                    info!(viewport = %current_id, key = %buffer.key(), "image displayed");
                    Ok(BindOutcome::Displayed(tier))
                }
                LoadOutcome::Ignored => Ok(BindOutcome::Displayed(
                    slot.viewport.displayed_tier().unwrap_or(tier),
                )),
                LoadOutcome::Stale => Err(ViewportError::Superseded),
            },
            Some(Err(LoadError::Fetch(error))) => {
                slot.viewport.fail_load(ticket, error.clone());
                warn!(viewport = %current_id, %error, state = slot.viewport.state().name(), "bind failed");
                Err(ViewportError::Load(LoadError::Fetch(error)))
            }
            Some(Err(other)) => {
                slot.viewport.abandon_load(ticket);
                Err(ViewportError::Load(other))
            }
        }
    }

    /// Returns `target` (or the active viewport) to `EMPTY`, cancelling its
    /// in-flight load and releasing its pinned cache entry.
    pub fn clear(&self, target: Option<ViewportId>) -> Result<(), ViewportError> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(target)?;
        self.release(slot);
        debug!(viewport = %slot.viewport.id(), "viewport cleared");
        Ok(())
    }

    // ── Manipulations ─────────────────────────────────────────────────────────

    pub fn zoom_by(&self, target: Option<ViewportId>, factor: f64) -> Result<f64, ViewportError> {
        self.manipulate(target, |vp| vp.zoom_by(factor))
    }

    pub fn zoom_to(&self, target: Option<ViewportId>, zoom: f64) -> Result<f64, ViewportError> {
        self.manipulate(target, |vp| vp.zoom_to(zoom))
    }

    pub fn zoom_in(&self, target: Option<ViewportId>) -> Result<f64, ViewportError> {
        self.manipulate(target, Viewport::zoom_in)
    }

    pub fn zoom_out(&self, target: Option<ViewportId>) -> Result<f64, ViewportError> {
        self.manipulate(target, Viewport::zoom_out)
    }

    pub fn pan_by(&self, target: Option<ViewportId>, dx: f64, dy: f64) -> Result<(f64, f64), ViewportError> {
        self.manipulate(target, |vp| vp.pan_by(dx, dy))
    }

    pub fn rotate(&self, target: Option<ViewportId>, rotation: Rotation) -> Result<f64, ViewportError> {
        self.manipulate(target, |vp| vp.rotate(rotation))
    }

    pub fn flip(&self, target: Option<ViewportId>, axis: FlipAxis) -> Result<(), ViewportError> {
        self.manipulate(target, |vp| vp.flip(axis))
    }

    pub fn set_window_level(
        &self,
        target: Option<ViewportId>,
        window: WindowLevel,
    ) -> Result<WindowLevel, ViewportError> {
        self.manipulate(target, |vp| vp.set_window_level(window))
    }

    pub fn adjust_window_level(
        &self,
        target: Option<ViewportId>,
        d_center: f64,
        d_width: f64,
    ) -> Result<WindowLevel, ViewportError> {
        self.manipulate(target, |vp| vp.adjust_window_level(d_center, d_width))
    }

    pub fn reset_manipulation(&self, target: Option<ViewportId>) -> Result<(), ViewportError> {
        self.manipulate(target, Viewport::reset)
    }

    pub fn manipulation(&self, target: Option<ViewportId>) -> Result<Manipulation, ViewportError> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(target)?;
        slot.viewport
            .manipulation()
            .copied()
            .ok_or(ViewportError::Manipulation(ManipulationError::NotDisplayed))
    }

    fn manipulate<T>(
        &self,
        target: Option<ViewportId>,
        op: impl FnOnce(&mut Viewport) -> Result<T, ManipulationError>,
    ) -> Result<T, ViewportError> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(target)?;
        Ok(op(&mut slot.viewport)?)
    }

    // ── Layout tracking ───────────────────────────────────────────────────────

    /// Remaps the viewports onto the viewport slots of `layout`.
    ///
    /// Slots that survived keep their viewport.  Viewports whose slot
    /// disappeared are handed, in reading order, to the new slots; any left
    /// over are cleared.  New slots with nothing to inherit start `EMPTY`.
    pub fn sync_with_layout(&self, layout: &LayoutConfiguration) {
        let slots = layout.viewport_slots();
        let mut table = self.table.lock();
        let previous_order = std::mem::take(&mut table.order);
        let mut previous = std::mem::take(&mut table.slots);

        let mut next = HashMap::with_capacity(slots.len());
        let mut order = Vec::with_capacity(slots.len());
        let mut fresh = Vec::new();
        for slot in &slots {
            let (width, height) = (slot.placement.rect.width, slot.placement.rect.height);
            match previous.remove(&slot.id) {
                Some(mut kept) => {
                    kept.viewport.set_frame(width, height);
                    next.insert(slot.id, kept);
                }
                None => fresh.push((slot.id, width, height)),
            }
            order.push(slot.id);
        }

        let mut orphans: Vec<Slot> = previous_order
            .iter()
            .filter_map(|id| previous.remove(id))
            .collect();
        orphans.reverse();
        let (mut remapped, mut created) = (0, 0);
        for (id, width, height) in fresh {
            let slot = match orphans.pop() {
                Some(mut orphan) => {
                    orphan.viewport.rehost(id, width, height);
                    remapped += 1;
                    orphan
                }
                None => {
                    created += 1;
                    Slot::new(Viewport::new(id, width, height, self.policy))
                }
            };
            next.insert(id, slot);
        }
        let dropped = orphans.len();
        for mut orphan in orphans {
            self.release(&mut orphan);
        }

        if table.active.map_or(true, |id| !next.contains_key(&id)) {
            table.active = order.first().copied();
        }
        table.slots = next;
        table.order = order;
        debug!(
            viewports = table.order.len(),
            remapped, created, dropped, "viewports synced with layout"
        );
    }

    /// Clears every viewport and releases all pins.
    pub fn clear_all(&self) {
        let mut table = self.table.lock();
        for slot in table.slots.values_mut() {
            self.release(slot);
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn pin(&self, slot: &mut Slot, buffer: &ImageBuffer) {
        if let Some(previous) = slot.pinned.take() {
            self.loader.unpin(&previous);
        }
        if self.loader.pin_buffer(buffer) {
            slot.pinned = Some(buffer.key());
        }
    }

    fn release(&self, slot: &mut Slot) {
        if let Some(cancel) = slot.cancel.take() {
            cancel.notify_one();
        }
        if slot.series.take().is_some() {
            self.loader.cancel_prefetch(slot.scope);
        }
        slot.viewport.clear();
        if let Some(key) = slot.pinned.take() {
            self.loader.unpin(&key);
        }
    }
}

impl LayoutListener for ViewportManager {
    fn layout_committed(&self, layout: &LayoutConfiguration, _changes: &[ElementChange]) {
        self.sync_with_layout(layout);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
