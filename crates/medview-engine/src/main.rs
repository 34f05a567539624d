//! medview headless engine entry point.
//!
//! Starts a [`ViewerSession`] from the TOML configuration, binds a series
//! into the first viewport, logs every engine event and cache statistics,
//! and keeps running until Ctrl-C.  A UI host would embed the library
//! instead; this binary exists to exercise the engine against real frames.
//!
//! # Usage
//!
//! ```text
//! medview-engine [OPTIONS]
//!
//! Options:
//!   --config     <PATH>    Config file [default: platform config dir]
//!   --preset     <NAME>    single | dual-horizontal | dual-vertical | quad [default: quad]
//!   --frames-dir <DIR>     Frame tree <DIR>/<series>/<frame>/<tier>.raw
//!                          [default: synthetic frames]
//!   --series     <NAME>    Series to open [default: first series found, or DEMO]
//!   --layout-dir <DIR>     Saved layouts [default: <config dir>/layouts]
//!   --once                 Exit after the demo instead of waiting for Ctrl-C
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load EngineConfig        (infrastructure::storage::config)
//!  └─ pick the image source    (FileImageSource or MockImageSource)
//!  └─ ViewerSession::start()   (loader, layout, viewports, drag, events)
//!  └─ event pump               (Tokio task logging EngineEvents)
//!  └─ demo: bind_in_series, step, save the layout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use medview_core::{ImageReference, LayoutPreset, QualityTier};
use medview_engine::application::events::EngineEvent;
use medview_engine::application::image_loader::ImageSource;
use medview_engine::application::session::ViewerSession;
use medview_engine::infrastructure::image_source::{FileImageSource, MockImageSource};
use medview_engine::infrastructure::storage::config::{self, EngineConfig};
use medview_engine::infrastructure::storage::layout_store::FileLayoutStore;

const DEMO_SERIES: &str = "DEMO";
const DEMO_FRAMES: u32 = 24;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Headless medical image display engine.
#[derive(Debug, Parser)]
#[command(
    name = "medview-engine",
    about = "Headless image cache, viewport and layout engine for multi-monitor reading",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// A missing file is treated as an empty one (all defaults).
    #[arg(long, env = "MEDVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Layout preset to start from.
    #[arg(long, default_value = "quad", env = "MEDVIEW_PRESET")]
    preset: LayoutPreset,

    /// Root of a frame tree; synthetic frames are used when absent.
    #[arg(long, env = "MEDVIEW_FRAMES_DIR")]
    frames_dir: Option<PathBuf>,

    /// Series to open in the first viewport.
    #[arg(long, env = "MEDVIEW_SERIES")]
    series: Option<String>,

    /// Directory holding saved layouts.
    #[arg(long, env = "MEDVIEW_LAYOUT_DIR")]
    layout_dir: Option<PathBuf>,

    /// Exit after the demo instead of waiting for Ctrl-C.
    #[arg(long)]
    once: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.engine.log_level)),
        )
        .init();

    info!(preset = %cli.preset, "medview engine starting");

    let (source, frames) = open_source(&cli).await?;
    let layout_dir = match &cli.layout_dir {
        Some(dir) => dir.clone(),
        None => config::config_dir()
            .context("no --layout-dir given and no platform config directory")?
            .join("layouts"),
    };
    let store = Arc::new(FileLayoutStore::new(&layout_dir));

    let settings = cfg
        .session_settings(cli.preset)
        .context("invalid engine configuration")?;
    let session = ViewerSession::start(source, store, settings).context("failed to start the viewer session")?;

    // ── Event pump ────────────────────────────────────────────────────────────
    let (_, mut events) = session.events().subscribe();
    let pump = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    run_demo(&session, frames, &cfg).await;

    if !cli.once {
        info!("medview engine ready.  Press Ctrl-C to exit.");
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        info!("shutdown signal received");
    }

    let stats = session.loader().stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_ratio = stats.hit_ratio(),
        prefetch_hit_ratio = stats.prefetch_hit_ratio(),
        fetches = stats.fetches,
        evictions = stats.evictions,
        resident_bytes = stats.resident_bytes,
        "final cache statistics"
    );
    session.shutdown();
    pump.abort();
    info!(layout_dir = %layout_dir.display(), "medview engine stopped");
    Ok(())
}

/// Picks the image source and the frames of the series to open.
async fn open_source(cli: &Cli) -> anyhow::Result<(Arc<dyn ImageSource>, Vec<ImageReference>)> {
    let Some(root) = &cli.frames_dir else {
        let series = cli.series.clone().unwrap_or_else(|| DEMO_SERIES.to_string());
        let frames = (0..DEMO_FRAMES)
            .map(|n| ImageReference::new(series.as_str(), format!("{n:04}"), n))
            .collect();
        info!(%series, "using synthetic frames");
        let source: Arc<dyn ImageSource> = Arc::new(MockImageSource::new());
        return Ok((source, frames));
    };

    let source = FileImageSource::new(root);
    let series = match &cli.series {
        Some(series) => series.clone(),
        None => first_series(root)
            .await
            .with_context(|| format!("no series directories under {}", root.display()))?,
    };
    let frames = source
        .list_series(&series)
        .await
        .with_context(|| format!("failed to list series '{series}'"))?;
    info!(%series, frames = frames.len(), root = %root.display(), "reading frames from disk");
    let source: Arc<dyn ImageSource> = Arc::new(source);
    Ok((source, frames))
}

async fn first_series(root: &std::path::Path) -> anyhow::Result<String> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names.into_iter().next().context("frame tree is empty")
}

/// Binds the series, steps through a few frames and saves the layout.
async fn run_demo(session: &ViewerSession, frames: Vec<ImageReference>, cfg: &EngineConfig) {
    if frames.is_empty() {
        warn!("series has no frames; nothing to display");
        return;
    }
    let viewports = session.viewports();

    match viewports
        .bind_in_series(None, frames.clone(), 0, QualityTier::Preview)
        .await
    {
        Ok(outcome) => info!(?outcome, "first frame displayed at preview quality"),
        Err(e) => warn!(error = %e, "failed to display first frame"),
    }
    if let Err(e) = viewports.bind_in_series(None, frames, 0, QualityTier::Full).await {
        warn!(error = %e, "failed to upgrade first frame to full quality");
    }

    for _ in 0..cfg.cache.prefetch_neighbours.max(1) {
        match viewports.step(None, 1, QualityTier::Full).await {
            Ok(outcome) => debug!(?outcome, "stepped forward"),
            Err(e) => {
                warn!(error = %e, "stopped stepping");
                break;
            }
        }
    }

    if let Err(e) = session.layout().save_as("last-session").await {
        warn!(error = %e, "could not save the layout");
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::LayoutChanged { layout, cause } => {
            info!(cause, version = layout.version(), elements = layout.elements().len(), "layout changed")
        }
        EngineEvent::ElementChanged { change, version } => debug!(?change, version, "element changed"),
        EngineEvent::DragPreview(preview) => {
            debug!(pointer = %preview.pointer, rect = ?preview.rect, "drag preview")
        }
        EngineEvent::DragCommitted {
            pointer,
            mutation,
            version,
            ..
        } => info!(%pointer, mutation, version, "drag committed"),
        EngineEvent::DragCancelled { pointer, reason, .. } => info!(%pointer, ?reason, "drag cancelled"),
    }
}
