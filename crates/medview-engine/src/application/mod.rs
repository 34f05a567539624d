//! Application layer of the display engine.
//!
//! # What lives here (for beginners)
//!
//! The domain crate (`medview_core`) knows what a valid layout or a legal
//! zoom is, but it owns no state and never waits.  This layer owns the live
//! state, runs the asynchronous work and talks to the outside world only
//! through traits (`ImageSource`, `LayoutStore`) that the infrastructure
//! layer implements.
//!
//! # Sub-modules
//!
//! - **`image_cache`**      – byte-budgeted resident cache with pinning and
//!   LRU or size-weighted eviction.  Synchronous; owned by the loader.
//! - **`image_loader`**     – the worker pool in front of an `ImageSource`:
//!   coalesces identical requests, serves lower-tier placeholders, runs
//!   foreground loads ahead of prefetch.
//! - **`viewport_manager`** – one viewport per layout slot; binding,
//!   manipulation, series stepping and pinning of displayed frames.
//! - **`layout_manager`**   – the single authoritative layout; serialised,
//!   validated mutations and persistence through a `LayoutStore`.
//! - **`drag`**             – interactive move / resize / swap / split /
//!   merge with snapping and live previews.
//! - **`events`**           – typed notifications for the host UI.
//! - **`session`**          – wires all of the above into one owned engine.

pub mod drag;
pub mod events;
pub mod image_cache;
pub mod image_loader;
pub mod layout_manager;
pub mod session;
pub mod viewport_manager;
