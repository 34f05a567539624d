//! Domain entities for the medview display engine.
//!
//! Everything in this module is pure: no file system, no network, no async
//! runtime.  The application layer in `medview-engine` owns the mutable
//! state (the authoritative layout, the viewport table, the image cache) and
//! drives these types.
//!
//! # Why keep the domain pure? (for beginners)
//!
//! The rules that make a layout valid, or decide whether a viewport may
//! replace its image, are the heart of the system.  Keeping them free of I/O
//! means they can be exercised by plain `#[test]` functions, benchmarked
//! with `criterion`, and reused by any front end without dragging a runtime
//! along.

/// Pixel geometry: points, rectangles, edges and axes.
pub mod geometry;
/// Image identifiers, quality tiers and decoded buffers.
pub mod image;
/// The layout configuration and its validated mutations.
pub mod layout;
pub mod preset;
/// Snapping and clamping math for drags.
pub mod snap;
pub mod snapshot;
/// Viewport state machine and manipulation math.
pub mod viewport;
