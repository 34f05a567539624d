//! Directory-backed image source used by the headless binary.
//!
//! Frames live at `<root>/<series>/<frame>/<tier>.raw`, where `<tier>` is
//! `thumbnail`, `preview` or `full`.  A `.raw` file is an 8-byte header
//! (width then height, both little-endian `u32`) followed by one byte per
//! pixel, row-major.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use medview_core::{FetchError, ImageBuffer, ImageReference, QualityTier};
use tracing::{debug, trace};

use crate::application::image_loader::ImageSource;

const HEADER_LEN: usize = 8;

/// Reads frames from a directory tree.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    root: PathBuf,
    timeout: Duration,
}

impl FileImageSource {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Fails a fetch with [`FetchError::Timeout`] if reading takes longer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_path(&self, reference: &ImageReference, tier: QualityTier) -> PathBuf {
        self.root
            .join(&reference.series.0)
            .join(&reference.frame)
            .join(format!("{}.raw", tier.as_str()))
    }

    /// Lists the frames of `series` in name order; ordinals follow that
    /// order.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] if the series directory does not exist.
    pub async fn list_series(&self, series: &str) -> Result<Vec<ImageReference>, FetchError> {
        let dir = self.root.join(series);
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| io_error(&dir, e))?;
        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                frames.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        frames.sort();
        debug!(series, frames = frames.len(), "listed series");
        Ok(frames
            .into_iter()
            .enumerate()
            .map(|(ordinal, frame)| ImageReference::new(series, frame, ordinal as u32))
            .collect())
    }

    async fn read(&self, reference: &ImageReference, tier: QualityTier) -> Result<ImageBuffer, FetchError> {
        let path = self.frame_path(reference, tier);
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
        decode(reference, tier, &bytes).map_err(|reason| {
            FetchError::ServerError(format!("{}: {reason}", path.display()))
        })
    }
}

/// Encodes a frame in the `.raw` layout.
pub fn encode(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + pixels.len());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(pixels);
    out
}

fn decode(reference: &ImageReference, tier: QualityTier, bytes: &[u8]) -> Result<ImageBuffer, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("truncated header ({} bytes)", bytes.len()));
    }
    let (header, pixels) = bytes.split_at(HEADER_LEN);
    let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(format!("{width}x{height} frame needs {expected} pixel bytes, found {}", pixels.len()));
    }
    Ok(ImageBuffer::new(reference.clone(), tier, width, height, pixels.to_vec()))
}

fn io_error(path: &Path, error: std::io::Error) -> FetchError {
    match error.kind() {
        ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
        ErrorKind::TimedOut => FetchError::Timeout(path.display().to_string()),
        _ => FetchError::ServerError(format!("{}: {error}", path.display())),
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn fetch_frame(&self, reference: &ImageReference, tier: QualityTier) -> Result<ImageBuffer, FetchError> {
        trace!(%reference, %tier, "reading frame from disk");
        match tokio::time::timeout(self.timeout, self.read(reference, tier)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(reference.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_frame(root: &Path, reference: &ImageReference, tier: QualityTier, contents: &[u8]) {
        let dir = root.join(&reference.series.0).join(&reference.frame);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(format!("{}.raw", tier.as_str())), contents)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_reads_header_and_pixels() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let reference = ImageReference::new("CT1", "0001", 0);
        write_frame(dir.path(), &reference, QualityTier::Preview, &encode(2, 3, &[1, 2, 3, 4, 5, 6])).await;
        let source = FileImageSource::new(dir.path());

        // Act
        let buffer = source.fetch_frame(&reference, QualityTier::Preview).await.unwrap();

        // Assert
        assert_eq!((buffer.width(), buffer.height()), (2, 3));
        assert_eq!(buffer.pixels(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.tier(), QualityTier::Preview);
    }

    #[tokio::test]
    async fn test_missing_frame_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileImageSource::new(dir.path());

        let result = source.fetch_frame(&ImageReference::new("CT1", "0001", 0), QualityTier::Full).await;

        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ImageReference::new("CT1", "0001", 0);
        write_frame(dir.path(), &reference, QualityTier::Full, &encode(4, 4, &[0; 3])).await;
        let source = FileImageSource::new(dir.path());

        let result = source.fetch_frame(&reference, QualityTier::Full).await;

        assert!(matches!(result, Err(FetchError::ServerError(_))));
    }

    #[tokio::test]
    async fn test_list_series_orders_frames_by_name() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        for frame in ["0003", "0001", "0002"] {
            write_frame(dir.path(), &ImageReference::new("MR", frame, 0), QualityTier::Thumbnail, &encode(1, 1, &[0])).await;
        }
        let source = FileImageSource::new(dir.path());

        // Act
        let frames = source.list_series("MR").await.unwrap();

        // Assert
        let names: Vec<_> = frames.iter().map(|r| (r.frame.as_str(), r.ordinal)).collect();
        assert_eq!(names, vec![("0001", 0), ("0002", 1), ("0003", 2)]);
        assert!(matches!(source.list_series("missing").await, Err(FetchError::NotFound(_))));
    }
}
