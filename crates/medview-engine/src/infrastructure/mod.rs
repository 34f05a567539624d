//! Infrastructure layer for the display engine.
//!
//! Contains the adapters that touch the outside world: image sources that
//! produce frame data and file-system storage for configuration and saved
//! layouts.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `medview_core`, but MUST NOT be imported by the `application` or domain
//! layers (tests excepted).

pub mod image_source;
pub mod storage;
