//! Fixed starting geometries.
//!
//! Every preset tiles the primary monitor with viewport slots in a regular
//! grid.  Integer division can leave a few pixels over; the last column and
//! the last row absorb them so the grid always covers the full monitor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::geometry::Rect;
use super::layout::{LayoutConfiguration, LayoutElement, LayoutError, Monitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    /// One viewport filling the monitor.
    Single,
    /// Two viewports side by side.
    DualHorizontal,
    /// Two viewports stacked top and bottom.
    DualVertical,
    /// A 2×2 grid.
    Quad,
}

impl LayoutPreset {
    pub const ALL: [LayoutPreset; 4] = [
        LayoutPreset::Single,
        LayoutPreset::DualHorizontal,
        LayoutPreset::DualVertical,
        LayoutPreset::Quad,
    ];

    /// `(columns, rows)` of the viewport grid.
    pub fn grid(self) -> (u32, u32) {
        match self {
            LayoutPreset::Single => (1, 1),
            LayoutPreset::DualHorizontal => (2, 1),
            LayoutPreset::DualVertical => (1, 2),
            LayoutPreset::Quad => (2, 2),
        }
    }

    pub fn viewport_count(self) -> usize {
        let (columns, rows) = self.grid();
        (columns * rows) as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutPreset::Single => "single",
            LayoutPreset::DualHorizontal => "dual-horizontal",
            LayoutPreset::DualVertical => "dual-vertical",
            LayoutPreset::Quad => "quad",
        }
    }

    /// Builds the preset on the primary monitor of `monitors`.
    ///
    /// Slots are created in reading order (row-major).
    ///
    /// # Errors
    ///
    /// Fails when `monitors` is unusable or the primary monitor is too small
    /// to hold the grid within the viewport slot size constraints.
    pub fn build(self, monitors: Vec<Monitor>) -> Result<LayoutConfiguration, LayoutError> {
        let base = LayoutConfiguration::empty(self.as_str(), monitors)?;
        let primary = base.primary_monitor().ok_or(LayoutError::NoMonitors)?.clone();

        let (columns, rows) = self.grid();
        let cell_width = primary.width / columns;
        let cell_height = primary.height / rows;

        let mut elements = Vec::with_capacity(self.viewport_count());
        for row in 0..rows {
            for column in 0..columns {
                let width = if column + 1 == columns {
                    primary.width - cell_width * column
                } else {
                    cell_width
                };
                let height = if row + 1 == rows {
                    primary.height - cell_height * row
                } else {
                    cell_height
                };
                let rect = Rect::new(
                    (cell_width * column) as i32,
                    (cell_height * row) as i32,
                    width,
                    height,
                );
                elements.push(LayoutElement::viewport_slot(primary.id, rect)?);
            }
        }

        let config = LayoutConfiguration::from_parts(self.as_str(), base.monitors().to_vec(), elements)?;
        Ok(config.tagged(self))
    }
}

impl fmt::Display for LayoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "single" | "1x1" => Ok(LayoutPreset::Single),
            "dual-horizontal" | "2x1" => Ok(LayoutPreset::DualHorizontal),
            "dual-vertical" | "1x2" => Ok(LayoutPreset::DualVertical),
            "quad" | "2x2" => Ok(LayoutPreset::Quad),
            other => Err(format!("unknown layout preset '{other}'")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layout::MonitorId;

    fn hd() -> Vec<Monitor> {
        vec![Monitor::new(0, 0, 0, 1920, 1080).as_primary()]
    }

    #[test]
    fn test_quad_preset_tiles_monitor_with_four_slots() {
        let config = LayoutPreset::Quad.build(hd()).unwrap();
        let rects: Vec<Rect> = config.viewport_slots().iter().map(|s| s.placement.rect).collect();
        assert_eq!(
            rects,
            vec![
                Rect::new(0, 0, 960, 540),
                Rect::new(960, 0, 960, 540),
                Rect::new(0, 540, 960, 540),
                Rect::new(960, 540, 960, 540),
            ]
        );
        assert_eq!(config.preset(), Some(LayoutPreset::Quad));
    }

    #[test]
    fn test_dual_horizontal_is_side_by_side() {
        let config = LayoutPreset::DualHorizontal.build(hd()).unwrap();
        let slots = config.viewport_slots();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].placement.rect.right(), slots[1].placement.rect.x);
    }

    #[test]
    fn test_dual_vertical_is_stacked() {
        let config = LayoutPreset::DualVertical.build(hd()).unwrap();
        let slots = config.viewport_slots();
        assert_eq!(slots[0].placement.rect.bottom(), slots[1].placement.rect.y);
    }

    #[test]
    fn test_odd_monitor_size_gives_remainder_to_last_cell() {
        let config = LayoutPreset::DualHorizontal
            .build(vec![Monitor::new(0, 0, 0, 1281, 1024)])
            .unwrap();
        let slots = config.viewport_slots();
        assert_eq!(slots[0].placement.rect.width, 640);
        assert_eq!(slots[1].placement.rect.width, 641);
    }

    #[test]
    fn test_preset_uses_primary_monitor() {
        let monitors = vec![
            Monitor::new(0, 0, 0, 1280, 1024),
            Monitor::new(1, 1280, 0, 1920, 1080).as_primary(),
        ];
        let config = LayoutPreset::Single.build(monitors).unwrap();
        assert_eq!(config.viewport_slots()[0].placement.monitor, MonitorId(1));
    }

    #[test]
    fn test_tiny_monitor_cannot_hold_quad() {
        let result = LayoutPreset::Quad.build(vec![Monitor::new(0, 0, 0, 200, 200)]);
        assert!(matches!(result, Err(LayoutError::ConstraintViolated { .. })));
    }

    #[test]
    fn test_preset_parses_from_cli_spelling() {
        assert_eq!("dual_vertical".parse::<LayoutPreset>().unwrap(), LayoutPreset::DualVertical);
        assert_eq!("QUAD".parse::<LayoutPreset>().unwrap(), LayoutPreset::Quad);
        assert!("hex".parse::<LayoutPreset>().is_err());
    }
}
