//! Image identifiers, quality tiers and decoded frame buffers.
//!
//! An [`ImageReference`] names one loadable frame of a series.  The same frame
//! can be fetched at several [`QualityTier`]s; the pair of the two is the
//! [`CacheKey`] used by the loader to deduplicate fetches and by the cache to
//! store decoded [`ImageBuffer`]s.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an ordered series of frames (e.g. one acquisition).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub String);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical identifier of one loadable frame plus its ordering within a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// The series this frame belongs to.
    pub series: SeriesId,
    /// Opaque frame identifier understood by the image source.
    pub frame: String,
    /// Position of the frame within its series.
    pub ordinal: u32,
}

impl ImageReference {
    pub fn new(series: impl Into<String>, frame: impl Into<String>, ordinal: u32) -> Self {
        Self {
            series: SeriesId(series.into()),
            frame: frame.into(),
            ordinal,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.series, self.frame)
    }
}

/// Fidelity/cost tier of a fetched frame.  Variants are declared in strictly
/// increasing order so the derived `Ord` matches fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Thumbnail,
    Preview,
    Full,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Thumbnail, QualityTier::Preview, QualityTier::Full];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Thumbnail => "thumbnail",
            QualityTier::Preview => "preview",
            QualityTier::Full => "full",
        }
    }

    /// Tiers strictly below `self`, highest fidelity first.
    pub fn lower_tiers(self) -> impl Iterator<Item = QualityTier> {
        Self::ALL.into_iter().rev().filter(move |t| *t < self)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one cache entry: a frame at a given tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub reference: ImageReference,
    pub tier: QualityTier,
}

impl CacheKey {
    pub fn new(reference: ImageReference, tier: QualityTier) -> Self {
        Self { reference, tier }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.reference, self.tier)
    }
}

/// Window/level (contrast) setting: the intensity interval mapped to the
/// display's grey ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub center: f64,
    pub width: f64,
}

/// Errors reported by the external image source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("image server error: {0}")]
    ServerError(String),
}

#[derive(Debug)]
struct FrameData {
    reference: ImageReference,
    tier: QualityTier,
    width: u32,
    height: u32,
    value_range: (f64, f64),
    default_window: Option<WindowLevel>,
    pixels: Vec<u8>,
}

/// A decoded frame.
///
/// Cloning is cheap: all clones share the same pixel allocation, which is how
/// the loader hands the *identical* buffer to every coalesced caller.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    inner: Arc<FrameData>,
}

impl ImageBuffer {
    /// Creates a buffer whose intensity range defaults to the 8-bit range.
    pub fn new(
        reference: ImageReference,
        tier: QualityTier,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Self {
        Self::with_metadata(reference, tier, width, height, (0.0, 255.0), None, pixels)
    }

    pub fn with_metadata(
        reference: ImageReference,
        tier: QualityTier,
        width: u32,
        height: u32,
        value_range: (f64, f64),
        default_window: Option<WindowLevel>,
        pixels: Vec<u8>,
    ) -> Self {
        let (lo, hi) = value_range;
        let value_range = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Self {
            inner: Arc::new(FrameData {
                reference,
                tier,
                width,
                height,
                value_range,
                default_window,
                pixels,
            }),
        }
    }

    pub fn reference(&self) -> &ImageReference {
        &self.inner.reference
    }

    pub fn tier(&self) -> QualityTier {
        self.inner.tier
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.inner.reference.clone(), self.inner.tier)
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Minimum and maximum stored intensity; bounds window/level adjustment.
    pub fn value_range(&self) -> (f64, f64) {
        self.inner.value_range
    }

    /// Window/level to use when the frame is first displayed.  Falls back to
    /// a window covering the full intensity range.
    pub fn default_window(&self) -> WindowLevel {
        self.inner.default_window.unwrap_or_else(|| {
            let (lo, hi) = self.inner.value_range;
            WindowLevel {
                center: (lo + hi) / 2.0,
                width: (hi - lo).max(1.0),
            }
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    /// Resident size charged against the cache capacity.
    pub fn byte_size(&self) -> usize {
        self.inner.pixels.len()
    }

    /// Returns `true` if both handles share the same allocation.
    pub fn ptr_eq(&self, other: &ImageBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ImageBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.inner.reference == other.inner.reference
                && self.inner.tier == other.inner.tier
                && self.inner.width == other.inner.width
                && self.inner.height == other.inner.height
                && self.inner.pixels == other.inner.pixels)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
