//! Storage infrastructure: configuration file and saved layouts.
//!
//! - **`config`**       – reads and writes the TOML engine configuration in
//!   the platform config directory, with defaults for everything missing.
//! - **`layout_store`** – the file-backed `LayoutStore` that keeps one JSON
//!   layout snapshot per file.
//!
//! Keeping file formats here means the application layer only ever sees the
//! `LayoutStore` trait and plain settings structs.

pub mod config;
pub mod layout_store;
