//! Controllable in-memory image source for tests and demos.
//!
//! Synthesises a frame for any reference, sized by tier, and lets a test
//! hold every fetch at a gate, inject failures for particular keys and count
//! how often each key reached the source.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use medview_core::{CacheKey, FetchError, ImageBuffer, ImageReference, QualityTier};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::image_loader::ImageSource;

/// A mock implementation of [`ImageSource`] with a fetch gate and counters.
pub struct MockImageSource {
    gate: watch::Sender<bool>,
    calls: Mutex<HashMap<CacheKey, usize>>,
    order: Mutex<Vec<CacheKey>>,
    failures: Mutex<HashMap<CacheKey, FetchError>>,
    latency: Mutex<Duration>,
}

impl MockImageSource {
    /// Creates a source with the gate open and no injected failures.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            gate,
            calls: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Holds every subsequent fetch until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Releases held fetches.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Makes every fetch of `(reference, tier)` fail with `error`.
    pub fn fail(&self, reference: &ImageReference, tier: QualityTier, error: FetchError) {
        self.failures
            .lock()
            .insert(CacheKey::new(reference.clone(), tier), error);
    }

    /// Adds a fixed delay to every fetch.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of fetches of `(reference, tier)` that reached the source.
    pub fn calls(&self, reference: &ImageReference, tier: QualityTier) -> usize {
        self.calls
            .lock()
            .get(&CacheKey::new(reference.clone(), tier))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Keys in the order their fetches reached the source.
    pub fn fetch_order(&self) -> Vec<CacheKey> {
        self.order.lock().clone()
    }

    /// Edge length in pixels of a synthesised frame.
    pub fn edge_for(tier: QualityTier) -> u32 {
        match tier {
            QualityTier::Thumbnail => 8,
            QualityTier::Preview => 32,
            QualityTier::Full => 128,
        }
    }

    /// The frame this source produces for `(reference, tier)`.
    pub fn frame_for(reference: &ImageReference, tier: QualityTier) -> ImageBuffer {
        let edge = Self::edge_for(tier);
        let shade = (reference.ordinal % 256) as u8;
        ImageBuffer::new(
            reference.clone(),
            tier,
            edge,
            edge,
            vec![shade; (edge * edge) as usize],
        )
    }
}

impl Default for MockImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch_frame(&self, reference: &ImageReference, tier: QualityTier) -> Result<ImageBuffer, FetchError> {
        let key = CacheKey::new(reference.clone(), tier);
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;
        self.order.lock().push(key.clone());

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so this only fails if the source is gone.
        let _ = gate.wait_for(|open| *open).await;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.failures.lock().get(&key).cloned() {
            return Err(error);
        }
        Ok(Self::frame_for(reference, tier))
    }
}
