//! TOML-based configuration persistence for the display engine.
//!
//! Reads and writes `EngineConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Medview\config.toml`
//! - Linux:    `~/.config/medview/config.toml`
//! - macOS:    `~/Library/Application Support/Medview/config.toml`
//!
//! # Example file
//!
//! ```toml
//! [engine]
//! log_level = "debug"
//!
//! [cache]
//! capacity_mib = 1024
//! workers = 6
//! eviction = "size_weighted"
//!
//! [snap]
//! grid_size = 10
//! modes = ["grid", "element_edge"]
//!
//! [[monitors]]
//! id = 0
//! origin_x = 0
//! origin_y = 0
//! width = 2560
//! height = 1440
//! primary = true
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Every field carries `#[serde(default = "...")]`, so a file that names only
//! the settings it wants to change is valid; everything else keeps the value
//! shown by `EngineConfig::default()`.  A missing file is the same as an
//! empty one.

use std::path::{Path, PathBuf};

use medview_core::{LayoutPreset, Monitor, QualityTier, SnapModes, SnapSettings, ViewportPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::image_cache::EvictionPolicy;
use crate::application::image_loader::{LoaderSettings, MAX_WORKERS};
use crate::application::session::SessionSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `[snap].modes` names a mode that does not exist.
    #[error("unknown snap mode '{0}' (expected grid, element_edge or monitor_edge)")]
    UnknownSnapMode(String),

    /// A value is outside its permitted range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level engine configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub snap: SnapConfig,
    /// Attached monitors.  Presets are laid out on the primary one.
    #[serde(default = "default_monitors")]
    pub monitors: Vec<Monitor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Image cache and loader settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Resident budget in MiB.
    #[serde(default = "default_capacity_mib")]
    pub capacity_mib: u64,
    /// Concurrent fetches.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Neighbours prefetched on each side of a bound series frame.
    #[serde(default = "default_prefetch_neighbours")]
    pub prefetch_neighbours: usize,
    #[serde(default = "default_prefetch_tier")]
    pub prefetch_tier: QualityTier,
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

/// Zoom, rotation and pan limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewportConfig {
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,
    /// Degrees per rotation step.
    #[serde(default = "default_rotation_step")]
    pub rotation_step: f64,
    /// Image pixels that must stay visible while panning.
    #[serde(default = "default_min_visible_px")]
    pub min_visible_px: u32,
}

/// Drag snapping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_element_tolerance")]
    pub element_tolerance: u32,
    #[serde(default = "default_monitor_tolerance")]
    pub monitor_tolerance: u32,
    #[serde(default = "default_trigger_radius")]
    pub trigger_radius: u32,
    /// Enabled modes by name; an empty list disables snapping.
    #[serde(default = "default_snap_modes")]
    pub modes: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_capacity_mib() -> u64 {
    512
}
fn default_workers() -> usize {
    4
}
fn default_prefetch_neighbours() -> usize {
    3
}
fn default_prefetch_tier() -> QualityTier {
    QualityTier::Preview
}
fn default_min_zoom() -> f64 {
    ViewportPolicy::default().min_zoom
}
fn default_max_zoom() -> f64 {
    ViewportPolicy::default().max_zoom
}
fn default_zoom_step() -> f64 {
    ViewportPolicy::default().zoom_step
}
fn default_rotation_step() -> f64 {
    ViewportPolicy::default().rotation_step
}
fn default_min_visible_px() -> u32 {
    ViewportPolicy::default().min_visible_px
}
fn default_grid_size() -> u32 {
    SnapSettings::default().grid_size
}
fn default_element_tolerance() -> u32 {
    SnapSettings::default().element_tolerance
}
fn default_monitor_tolerance() -> u32 {
    SnapSettings::default().monitor_tolerance
}
fn default_trigger_radius() -> u32 {
    SnapSettings::default().trigger_radius
}
fn default_snap_modes() -> Vec<String> {
    vec!["grid".to_string(), "element_edge".to_string(), "monitor_edge".to_string()]
}
fn default_monitors() -> Vec<Monitor> {
    vec![Monitor::new(0, 0, 0, 1920, 1080).as_primary()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: GeneralConfig::default(),
            cache: CacheConfig::default(),
            viewport: ViewportConfig::default(),
            snap: SnapConfig::default(),
            monitors: default_monitors(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_mib: default_capacity_mib(),
            workers: default_workers(),
            prefetch_neighbours: default_prefetch_neighbours(),
            prefetch_tier: default_prefetch_tier(),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            zoom_step: default_zoom_step(),
            rotation_step: default_rotation_step(),
            min_visible_px: default_min_visible_px(),
        }
    }
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            element_tolerance: default_element_tolerance(),
            monitor_tolerance: default_monitor_tolerance(),
            trigger_radius: default_trigger_radius(),
            modes: default_snap_modes(),
        }
    }
}

// ── Conversions into engine settings ──────────────────────────────────────────

impl EngineConfig {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for a zero capacity or a worker count outside
    /// `1..=MAX_WORKERS`.
    pub fn loader_settings(&self) -> Result<LoaderSettings, ConfigError> {
        if self.cache.capacity_mib == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.capacity_mib",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(1..=MAX_WORKERS).contains(&self.cache.workers) {
            return Err(ConfigError::Invalid {
                field: "cache.workers",
                reason: format!("must be between 1 and {MAX_WORKERS}"),
            });
        }
        let capacity_bytes = usize::try_from(self.cache.capacity_mib.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX);
        Ok(LoaderSettings {
            capacity_bytes,
            workers: self.cache.workers,
            prefetch_neighbours: self.cache.prefetch_neighbours,
            prefetch_tier: self.cache.prefetch_tier,
            eviction: self.cache.eviction,
        })
    }

    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the zoom range is empty or not positive.
    pub fn viewport_policy(&self) -> Result<ViewportPolicy, ConfigError> {
        let v = &self.viewport;
        if !(v.min_zoom > 0.0 && v.min_zoom <= v.max_zoom) {
            return Err(ConfigError::Invalid {
                field: "viewport.min_zoom",
                reason: format!("need 0 < min_zoom <= max_zoom, got {} and {}", v.min_zoom, v.max_zoom),
            });
        }
        if v.zoom_step <= 1.0 {
            return Err(ConfigError::Invalid {
                field: "viewport.zoom_step",
                reason: format!("must be greater than 1, got {}", v.zoom_step),
            });
        }
        Ok(ViewportPolicy {
            min_zoom: v.min_zoom,
            max_zoom: v.max_zoom,
            zoom_step: v.zoom_step,
            rotation_step: v.rotation_step,
            min_visible_px: v.min_visible_px,
        })
    }

    /// # Errors
    ///
    /// [`ConfigError::UnknownSnapMode`] for an unrecognised mode name.
    pub fn snap_settings(&self) -> Result<SnapSettings, ConfigError> {
        let mut modes = SnapModes::NONE;
        for name in &self.snap.modes {
            modes = modes | SnapModes::from_name(name).ok_or_else(|| ConfigError::UnknownSnapMode(name.clone()))?;
        }
        Ok(SnapSettings {
            modes,
            grid_size: self.snap.grid_size,
            element_tolerance: self.snap.element_tolerance,
            monitor_tolerance: self.snap.monitor_tolerance,
            trigger_radius: self.snap.trigger_radius,
        })
    }

    /// Everything a `ViewerSession` needs, starting from `preset`.
    ///
    /// # Errors
    ///
    /// Any error of the individual conversions above.
    pub fn session_settings(&self, preset: LayoutPreset) -> Result<SessionSettings, ConfigError> {
        Ok(SessionSettings {
            loader: self.loader_settings()?,
            viewport: self.viewport_policy()?,
            snap: self.snap_settings()?,
            monitors: self.monitors.clone(),
            preset,
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `EngineConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `EngineConfig` from `path`, returning `EngineConfig::default()` if
/// the file does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory, including the `medview`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Medview"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("medview"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Medview")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_has_one_primary_monitor() {
        // Arrange / Act
        let cfg = EngineConfig::default();

        // Assert
        assert_eq!(cfg.monitors.len(), 1);
        assert!(cfg.monitors[0].primary);
        assert_eq!((cfg.monitors[0].width, cfg.monitors[0].height), (1920, 1080));
    }

    #[test]
    fn test_default_settings_match_engine_defaults() {
        let cfg = EngineConfig::default();

        assert_eq!(cfg.loader_settings().unwrap(), LoaderSettings::default());
        assert_eq!(cfg.viewport_policy().unwrap(), ViewportPolicy::default());
        assert_eq!(cfg.snap_settings().unwrap(), SnapSettings::default());
        assert_eq!(cfg.engine.log_level, "info");
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: EngineConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_deserialize_partial_sections_override_defaults() {
        // Arrange
        let toml_str = r#"
[cache]
capacity_mib = 64
eviction = "size_weighted"

[snap]
modes = ["grid"]
"#;

        // Act
        let cfg: EngineConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        let loader = cfg.loader_settings().unwrap();
        assert_eq!(loader.capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(loader.eviction, EvictionPolicy::SizeWeighted);
        assert_eq!(loader.workers, 4);
        assert_eq!(cfg.snap_settings().unwrap().modes, SnapModes::GRID);
        assert_eq!(cfg.snap.grid_size, 8);
    }

    #[test]
    fn test_monitor_array_is_read() {
        let toml_str = r#"
[[monitors]]
id = 0
origin_x = 0
origin_y = 0
width = 2560
height = 1440
primary = true

[[monitors]]
id = 1
origin_x = 2560
origin_y = 0
width = 1920
height = 1080
"#;

        let cfg: EngineConfig = toml::from_str(toml_str).expect("deserialize monitors");

        assert_eq!(cfg.monitors.len(), 2);
        assert!(!cfg.monitors[1].primary);
        assert_eq!(cfg.monitors[1].origin_x, 2560);
    }

    #[test]
    fn test_session_settings_carry_monitors_and_preset() {
        let cfg = EngineConfig::default();

        let settings = cfg.session_settings(LayoutPreset::Quad).unwrap();

        assert_eq!(settings.preset, LayoutPreset::Quad);
        assert_eq!(settings.monitors, cfg.monitors);
    }

    #[test]
    fn test_unknown_snap_mode_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.snap.modes = vec!["magnetic".to_string()];

        assert!(matches!(cfg.snap_settings(), Err(ConfigError::UnknownSnapMode(m)) if m == "magnetic"));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.cache.workers = 0;
        assert!(matches!(cfg.loader_settings(), Err(ConfigError::Invalid { field: "cache.workers", .. })));

        let mut cfg = EngineConfig::default();
        cfg.viewport.min_zoom = 5.0;
        cfg.viewport.max_zoom = 2.0;
        assert!(matches!(cfg.viewport_policy(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_save_then_load_round_trips_through_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = EngineConfig::default();
        cfg.cache.workers = 8;
        cfg.engine.log_level = "debug".to_string();

        // Act
        save_config_to(&cfg, &path).unwrap();
        let restored = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }
}
