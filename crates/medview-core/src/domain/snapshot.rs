//! Opaque serialized form of a [`LayoutConfiguration`].
//!
//! The persistence collaborator stores snapshots as bytes without looking
//! inside.  The payload is JSON wrapped in a small envelope carrying a schema
//! version, so a future format change can be detected on restore instead of
//! producing a half-understood layout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::layout::{LayoutConfiguration, LayoutError};

/// Current envelope schema.
pub const SNAPSHOT_SCHEMA: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode layout snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode layout snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot describes an invalid layout: {0}")]
    Invalid(#[from] LayoutError),

    #[error("unsupported snapshot schema {found} (expected {expected})", expected = SNAPSHOT_SCHEMA)]
    UnsupportedVersion { found: u32 },
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema: u32,
    layout: &'a LayoutConfiguration,
}

#[derive(Deserialize)]
struct Envelope {
    schema: u32,
    layout: LayoutConfiguration,
}

/// Serialized layout bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSnapshot(Vec<u8>);

impl LayoutSnapshot {
    /// Serializes the full configuration, monitors included.
    pub fn capture(config: &LayoutConfiguration) -> Result<Self, SnapshotError> {
        let envelope = EnvelopeRef {
            schema: SNAPSHOT_SCHEMA,
            layout: config,
        };
        serde_json::to_vec_pretty(&envelope)
            .map(Self)
            .map_err(SnapshotError::Encode)
    }

    /// Decodes and re-validates the configuration.
    ///
    /// A snapshot edited by hand (or written by a buggy store) can describe
    /// an invalid layout; it is rejected rather than exposed.
    pub fn restore(&self) -> Result<LayoutConfiguration, SnapshotError> {
        let envelope: Envelope = serde_json::from_slice(&self.0).map_err(SnapshotError::Decode)?;
        if envelope.schema != SNAPSHOT_SCHEMA {
            return Err(SnapshotError::UnsupportedVersion {
                found: envelope.schema,
            });
        }
        envelope.layout.validate()?;
        Ok(envelope.layout)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Rect;
    use crate::domain::layout::{LayoutElement, LayoutMutation, Monitor, MonitorId, Orientation};
    use crate::domain::preset::LayoutPreset;

    #[test]
    fn test_snapshot_round_trip_preserves_monitors_and_elements() {
        // Arrange
        let monitors = vec![
            Monitor::new(0, 0, 0, 1920, 1080).as_primary(),
            Monitor::new(1, 1920, 0, 1280, 1024),
        ];
        let config = LayoutPreset::DualHorizontal.build(monitors).unwrap();
        let toolbar =
            LayoutElement::toolbar(MonitorId(1), Rect::new(0, 0, 1280, 40), Orientation::Horizontal)
                .unwrap();
        let config = config.apply(&LayoutMutation::Add(toolbar)).unwrap().configuration;

        // Act
        let restored = LayoutSnapshot::capture(&config).unwrap().restore().unwrap();

        // Assert
        assert_eq!(restored, config);
    }

    #[test]
    fn test_snapshot_with_unknown_schema_is_rejected() {
        let config = LayoutPreset::Single
            .build(vec![Monitor::new(0, 0, 0, 800, 600)])
            .unwrap();
        let bytes = LayoutSnapshot::capture(&config).unwrap().into_bytes();
        let text = String::from_utf8(bytes).unwrap().replacen("\"schema\": 1", "\"schema\": 9", 1);
        let result = LayoutSnapshot::from_bytes(text.into_bytes()).restore();
        assert!(matches!(result, Err(SnapshotError::UnsupportedVersion { found: 9 })));
    }

    #[test]
    fn test_snapshot_describing_invalid_layout_is_rejected() {
        let config = LayoutPreset::Single
            .build(vec![Monitor::new(0, 0, 0, 800, 600)])
            .unwrap();
        let bytes = LayoutSnapshot::capture(&config).unwrap().into_bytes();
        let text = String::from_utf8(bytes).unwrap().replacen("\"width\": 800", "\"width\": 400", 1);
        let result = LayoutSnapshot::from_bytes(text.into_bytes()).restore();
        assert!(matches!(result, Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = LayoutSnapshot::from_bytes(b"not json".to_vec()).restore();
        assert!(matches!(result, Err(SnapshotError::Decode(_))));
    }
}
