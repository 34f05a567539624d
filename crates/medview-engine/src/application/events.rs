//! EventBus: typed notifications from the engine to the host UI.
//!
//! The host subscribes once per consumer and receives every [`EngineEvent`]
//! published after the subscription on an unbounded Tokio channel.  Events
//! are published from synchronous code paths (layout commit, pointer moves),
//! so `publish` never awaits; a closed receiver is pruned on the next
//! publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use medview_core::{ElementChange, ElementId, LayoutConfiguration, Rect, SnapGuide};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use super::drag::{CancelReason, DragKind, PointerId};

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new layout became authoritative.
    LayoutChanged {
        layout: Arc<LayoutConfiguration>,
        /// What caused the change (`"preset"`, `"restore"`, a mutation name …).
        cause: &'static str,
    },
    /// One element was added, removed or updated by the commit at `version`.
    ElementChanged { change: ElementChange, version: u64 },
    /// Live feedback while a drag is in progress.
    DragPreview(DragPreview),
    /// A drag ended with exactly one applied mutation.
    DragCommitted {
        pointer: PointerId,
        element: ElementId,
        mutation: &'static str,
        version: u64,
    },
    /// A drag ended without changing the layout.
    DragCancelled {
        pointer: PointerId,
        element: ElementId,
        reason: CancelReason,
    },
}

/// Payload of [`EngineEvent::DragPreview`].
#[derive(Debug, Clone, PartialEq)]
pub struct DragPreview {
    pub pointer: PointerId,
    pub element: ElementId,
    pub kind: DragKind,
    /// Geometry the dragged element would take on drop, if the pointer is
    /// over a valid candidate.
    pub rect: Option<Rect>,
    /// Drop targets within their trigger radius.
    pub highlighted: Vec<ElementId>,
    /// Lines the candidate geometry snapped to.
    pub guides: Vec<SnapGuide>,
}

/// Fan-out of engine events to any number of subscribers.
///
/// Cloning is cheap; all clones share the subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<EngineEvent>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<EngineEvent>) {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().insert(id, tx);
        trace!(subscription = id.0, "event subscriber added");
        (id, rx)
    }

    /// Returns `false` if the subscription was unknown (or already pruned).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.lock().remove(&id).is_some()
    }

    /// Delivers `event` to every live subscriber.
    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|id, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                trace!(subscription = id.0, "pruned closed event subscriber");
            }
            delivered
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
