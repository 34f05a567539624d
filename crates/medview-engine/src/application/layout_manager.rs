//! LayoutManager: owner of the single authoritative layout.
//!
//! Readers call [`LayoutManager::current`] and get an `Arc` to an immutable,
//! validated [`LayoutConfiguration`].  Writers go through
//! [`LayoutManager::apply`] (or one of its helpers), which:
//!
//! 1. waits for its turn on a FIFO async mutex, so concurrent mutations queue
//!    instead of interleaving,
//! 2. applies the mutation to a copy and validates it (see
//!    `medview_core::domain::layout`),
//! 3. on success swaps the new configuration in, informs listeners and
//!    publishes events; on failure returns the specific
//!    [`LayoutError`] and leaves the current layout untouched.
//!
//! # Why an `Arc` swap? (for beginners)
//!
//! Readers (the drag engine, the viewport manager, the UI) only hold the
//! read lock long enough to clone an `Arc`.  A reader that started before a
//! commit keeps using the old, still fully valid configuration.  Nobody can
//! ever observe a half-applied mutation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use medview_core::{
    Axis, ElementChange, ElementId, LayoutConfiguration, LayoutElement, LayoutError, LayoutMutation,
    LayoutPreset, LayoutSnapshot, Monitor, MonitorId, Rect, SnapshotError,
};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::events::{EngineEvent, EventBus};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Errors reported by a [`LayoutStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no saved layout named '{0}'")]
    NotFound(String),

    #[error("invalid layout name '{0}'")]
    InvalidName(String),

    #[error("I/O error for layout '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("layout store error: {0}")]
    Backend(String),
}

/// External persistence collaborator.  Snapshots are opaque bytes to it.
///
/// Names have the form `scope/name`; a bare name belongs to the `default`
/// scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LayoutStore: Send + Sync {
    async fn save(&self, name: &str, snapshot: &LayoutSnapshot) -> Result<(), StoreError>;

    async fn load(&self, name: &str) -> Result<LayoutSnapshot, StoreError>;

    /// Names saved under `scope`, sorted.
    async fn list(&self, scope: &str) -> Result<Vec<String>, StoreError>;
}

/// Errors from [`LayoutManager::save_as`] and [`LayoutManager::restore`].
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Synchronous hook run after every commit, before events are published.
pub trait LayoutListener: Send + Sync {
    fn layout_committed(&self, layout: &LayoutConfiguration, changes: &[ElementChange]);
}

// ── LayoutManager ─────────────────────────────────────────────────────────────

pub struct LayoutManager {
    current: RwLock<Arc<LayoutConfiguration>>,
    /// Serialises writers; `tokio::sync::Mutex` grants the lock in FIFO order.
    mutations: AsyncMutex<()>,
    store: Arc<dyn LayoutStore>,
    events: EventBus,
    listeners: RwLock<Vec<Arc<dyn LayoutListener>>>,
}

impl LayoutManager {
    pub fn new(initial: LayoutConfiguration, store: Arc<dyn LayoutStore>, events: EventBus) -> Self {
        info!(
            layout = initial.name(),
            elements = initial.elements().len(),
            monitors = initial.monitors().len(),
            "layout manager started"
        );
        Self {
            current: RwLock::new(Arc::new(initial)),
            mutations: AsyncMutex::new(()),
            store,
            events,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Starts from `preset` laid out on `monitors`.
    pub fn from_preset(
        preset: LayoutPreset,
        monitors: Vec<Monitor>,
        store: Arc<dyn LayoutStore>,
        events: EventBus,
    ) -> Result<Self, LayoutError> {
        Ok(Self::new(preset.build(monitors)?, store, events))
    }

    /// The authoritative configuration at this instant.
    pub fn current(&self) -> Arc<LayoutConfiguration> {
        Arc::clone(&self.current.read())
    }

    pub fn add_listener(&self, listener: Arc<dyn LayoutListener>) {
        self.listeners.write().push(listener);
    }

    /// Validates and applies one mutation.
    ///
    /// # Errors
    ///
    /// Returns the rule the mutation would break; the current layout is
    /// unchanged in that case.
    pub async fn apply(&self, mutation: LayoutMutation) -> Result<Arc<LayoutConfiguration>, LayoutError> {
        let _turn = self.mutations.lock().await;
        let result = self.current().apply(&mutation)?;
        Ok(self.commit(result.configuration, &result.changes, mutation.name()))
    }

    // ── Mutation helpers ──────────────────────────────────────────────────────

    pub async fn add_element(&self, element: LayoutElement) -> Result<ElementId, LayoutError> {
        let id = element.id();
        self.apply(LayoutMutation::Add(element)).await?;
        Ok(id)
    }

    pub async fn remove_element(&self, id: ElementId) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::Remove(id)).await.map(drop)
    }

    pub async fn set_rect(&self, id: ElementId, rect: Rect) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::SetRect { id, rect }).await.map(drop)
    }

    pub async fn move_to(&self, id: ElementId, x: i32, y: i32) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::MoveTo { id, x, y }).await.map(drop)
    }

    pub async fn resize(&self, id: ElementId, width: u32, height: u32) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::Resize { id, width, height }).await.map(drop)
    }

    /// Reassigns an element to another monitor, keeping its relative
    /// position on screen.
    pub async fn move_to_monitor(&self, id: ElementId, monitor: MonitorId) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::MoveToMonitor { id, monitor }).await.map(drop)
    }

    pub async fn swap(&self, first: ElementId, second: ElementId) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::Swap { first, second }).await.map(drop)
    }

    /// Splits a viewport slot; returns the id of the new second half.
    pub async fn split(&self, id: ElementId, axis: Axis, at: u32) -> Result<ElementId, LayoutError> {
        let mutation = LayoutMutation::split(id, axis, at);
        let new_id = match &mutation {
            LayoutMutation::Split { new_id, .. } => *new_id,
            _ => id,
        };
        self.apply(mutation).await?;
        Ok(new_id)
    }

    pub async fn merge(&self, keep: ElementId, absorb: ElementId) -> Result<(), LayoutError> {
        self.apply(LayoutMutation::Merge { keep, absorb }).await.map(drop)
    }

    // ── Whole-layout replacement ──────────────────────────────────────────────

    /// Replaces the layout with `preset` on the current monitors.
    pub async fn load_preset(&self, preset: LayoutPreset) -> Result<Arc<LayoutConfiguration>, LayoutError> {
        let _turn = self.mutations.lock().await;
        let current = self.current();
        let next = preset.build(current.monitors().to_vec())?.succeeding(&current);
        let changes = diff(&current, &next);
        Ok(self.commit(next, &changes, "preset"))
    }

    /// Swaps in a new monitor set, e.g. after a display was unplugged.
    pub async fn replace_monitors(&self, monitors: Vec<Monitor>) -> Result<Arc<LayoutConfiguration>, LayoutError> {
        let _turn = self.mutations.lock().await;
        let next = self.current().with_monitors(monitors)?;
        Ok(self.commit(next, &[], "monitors"))
    }

    /// Captures the current layout for an external persistence collaborator.
    pub fn serialize(&self) -> Result<LayoutSnapshot, SnapshotError> {
        LayoutSnapshot::capture(&self.current())
    }

    /// Validates `snapshot` and makes it the current layout.
    pub async fn deserialize(&self, snapshot: &LayoutSnapshot) -> Result<Arc<LayoutConfiguration>, SnapshotError> {
        let next = snapshot.restore()?;
        let _turn = self.mutations.lock().await;
        let current = self.current();
        let next = next.succeeding(&current);
        let changes = diff(&current, &next);
        Ok(self.commit(next, &changes, "restore"))
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    pub async fn save_as(&self, name: &str) -> Result<(), PersistError> {
        let snapshot = self.serialize()?;
        self.store.save(name, &snapshot).await?;
        info!(name, bytes = snapshot.as_bytes().len(), "layout saved");
        Ok(())
    }

    pub async fn restore(&self, name: &str) -> Result<Arc<LayoutConfiguration>, PersistError> {
        let snapshot = self.store.load(name).await?;
        let layout = self.deserialize(&snapshot).await?;
        info!(name, version = layout.version(), "layout restored");
        Ok(layout)
    }

    pub async fn list(&self, scope: &str) -> Result<Vec<String>, StoreError> {
        self.store.list(scope).await
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Makes `next` authoritative.  Callers hold the mutation lock.
    fn commit(
        &self,
        next: LayoutConfiguration,
        changes: &[ElementChange],
        cause: &'static str,
    ) -> Arc<LayoutConfiguration> {
        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.layout_committed(&next, changes);
        }

        for change in changes {
            self.events.publish(EngineEvent::ElementChanged {
                change: *change,
                version: next.version(),
            });
        }
        self.events.publish(EngineEvent::LayoutChanged {
            layout: Arc::clone(&next),
            cause,
        });
        info!(
            cause,
            version = next.version(),
            changes = changes.len(),
            elements = next.elements().len(),
            "layout committed"
        );
        next
    }
}

/// Element-level differences between two layouts.
fn diff(old: &LayoutConfiguration, new: &LayoutConfiguration) -> Vec<ElementChange> {
    let before: HashMap<ElementId, &LayoutElement> = old.elements().iter().map(|e| (e.id(), e)).collect();
    let mut changes = Vec::new();
    for element in new.elements() {
        match before.get(&element.id()) {
            None => changes.push(ElementChange::Added(element.id())),
            Some(previous) if *previous != element => changes.push(ElementChange::Updated(element.id())),
            Some(_) => {}
        }
    }
    for element in old.elements() {
        if new.element(element.id()).is_none() {
            changes.push(ElementChange::Removed(element.id()));
        }
    }
    debug!(changes = changes.len(), "computed layout diff");
    changes
}

// ── Tests ─────────────────────────────────────────────────────────────────────
