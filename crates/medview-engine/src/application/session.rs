//! ViewerSession: one explicitly owned engine instance.
//!
//! ```text
//! ViewerSession::start(source, store, settings)
//!  ├─ EventBus
//!  ├─ ImageLoader      (spawns the fetch workers)
//!  ├─ LayoutManager    (initial preset on the configured monitors)
//!  ├─ ViewportManager  (registered as a layout listener)
//!  ├─ DragEngine
//!  └─ stats reporter   (debug log on every cache counter update)
//! ```
//!
//! Nothing here is global: a host can run two sessions side by side, and a
//! test builds a fresh one per case.  [`ViewerSession::shutdown`] clears the
//! viewports, fails all in-flight loads and stops the background tasks.

use std::sync::Arc;

use medview_core::{LayoutError, LayoutPreset, Monitor, SnapSettings, ViewportPolicy};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::drag::DragEngine;
use super::events::EventBus;
use super::image_loader::{ImageLoader, ImageSource, LoaderSettings};
use super::layout_manager::{LayoutListener, LayoutManager, LayoutStore};
use super::viewport_manager::ViewportManager;

/// Everything needed to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub loader: LoaderSettings,
    pub viewport: ViewportPolicy,
    pub snap: SnapSettings,
    pub monitors: Vec<Monitor>,
    pub preset: LayoutPreset,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            loader: LoaderSettings::default(),
            viewport: ViewportPolicy::default(),
            snap: SnapSettings::default(),
            monitors: vec![Monitor::new(0, 0, 0, 1920, 1080).as_primary()],
            preset: LayoutPreset::Single,
        }
    }
}

pub struct ViewerSession {
    events: EventBus,
    loader: Arc<ImageLoader>,
    layout: Arc<LayoutManager>,
    viewports: Arc<ViewportManager>,
    drag: Arc<DragEngine>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl ViewerSession {
    /// Wires the components together.  Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`LayoutError`] if the preset cannot be laid out on `monitors`
    /// (no monitors, no primary, too small for the viewports …).
    pub fn start(
        source: Arc<dyn ImageSource>,
        store: Arc<dyn LayoutStore>,
        settings: SessionSettings,
    ) -> Result<Self, LayoutError> {
        let events = EventBus::new();
        let layout = Arc::new(LayoutManager::from_preset(
            settings.preset,
            settings.monitors,
            store,
            events.clone(),
        )?);
        let loader = Arc::new(ImageLoader::new(source, settings.loader));
        let viewports = Arc::new(ViewportManager::new(
            Arc::clone(&loader),
            settings.viewport,
            &layout.current(),
        ));
        layout.add_listener(Arc::clone(&viewports) as Arc<dyn LayoutListener>);
        let drag = Arc::new(DragEngine::new(Arc::clone(&layout), settings.snap, events.clone()));

        let mut stats = loader.subscribe_stats();
        let reporter = tokio::spawn(async move {
            while stats.changed().await.is_ok() {
                let s = stats.borrow_and_update().clone();
                debug!(
                    hits = s.hits,
                    misses = s.misses,
                    fetches = s.fetches,
                    failures = s.fetch_failures,
                    resident_bytes = s.resident_bytes,
                    entries = s.entries,
                    "cache stats"
                );
            }
        });

        info!(
            preset = settings.preset.as_str(),
            viewports = viewports.viewport_ids().len(),
            "viewer session started"
        );
        Ok(Self {
            events,
            loader,
            layout,
            viewports,
            drag,
            reporter: Mutex::new(Some(reporter)),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn loader(&self) -> &Arc<ImageLoader> {
        &self.loader
    }

    pub fn layout(&self) -> &Arc<LayoutManager> {
        &self.layout
    }

    pub fn viewports(&self) -> &Arc<ViewportManager> {
        &self.viewports
    }

    pub fn drag(&self) -> &Arc<DragEngine> {
        &self.drag
    }

    pub fn is_running(&self) -> bool {
        !self.loader.is_shut_down()
    }

    /// Clears every viewport, shuts the loader down and stops the stats
    /// reporter.  Idempotent.
    pub fn shutdown(&self) {
        if !self.is_running() {
            return;
        }
        self.viewports.clear_all();
        self.loader.shutdown();
        if let Some(reporter) = self.reporter.lock().take() {
            reporter.abort();
        }
        info!("viewer session shut down");
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.get_mut().take() {
            reporter.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::layout_manager::MockLayoutStore;
    use crate::infrastructure::image_source::MockImageSource;
    use medview_core::{ImageReference, QualityTier, ViewportState};

    fn start(preset: LayoutPreset) -> (ViewerSession, Arc<MockImageSource>) {
        let source = Arc::new(MockImageSource::new());
        let settings = SessionSettings {
            preset,
            ..SessionSettings::default()
        };
        let session = ViewerSession::start(
            Arc::clone(&source) as Arc<dyn ImageSource>,
            Arc::new(MockLayoutStore::new()),
            settings,
        )
        .unwrap();
        (session, source)
    }

    #[tokio::test]
    async fn test_start_creates_one_viewport_per_preset_slot() {
        let (session, _) = start(LayoutPreset::Quad);

        assert_eq!(session.viewports().viewport_ids().len(), 4);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_layout_change_resyncs_viewports() {
        // Arrange
        let (session, _) = start(LayoutPreset::Single);

        // Act
        session.layout().load_preset(LayoutPreset::Quad).await.unwrap();

        // Assert
        assert_eq!(session.viewports().viewport_ids().len(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_clears_viewports_and_stops_loader() {
        // Arrange
        let (session, _) = start(LayoutPreset::Single);
        let id = session.viewports().viewport_ids()[0];
        let frame = ImageReference::new("S1", "0001", 0);
        session
            .viewports()
            .bind(Some(id), frame.clone(), QualityTier::Preview)
            .await
            .unwrap();

        // Act
        session.shutdown();
        session.shutdown();

        // Assert
        assert_eq!(session.viewports().state(id), Some(ViewportState::Empty));
        assert!(!session.is_running());
        assert!(!session.loader().is_resident(&frame, QualityTier::Preview));
    }

    #[tokio::test]
    async fn test_start_fails_without_monitors() {
        let result = ViewerSession::start(
            Arc::new(MockImageSource::new()),
            Arc::new(MockLayoutStore::new()),
            SessionSettings {
                monitors: Vec::new(),
                ..SessionSettings::default()
            },
        );

        assert!(matches!(result, Err(LayoutError::NoMonitors)));
    }
}
