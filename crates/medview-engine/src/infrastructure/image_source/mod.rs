//! Image source adapters.
//!
//! Both implement the [`ImageSource`](crate::application::image_loader::ImageSource)
//! port the loader fetches through:
//!
//! - **`filesystem`** – frames stored as `.raw` files under a directory tree.
//! - **`mock`**       – synthetic frames with a fetch gate, call counters and
//!   injected failures, for tests and demos.

pub mod filesystem;
pub mod mock;

pub use filesystem::FileImageSource;
pub use mock::MockImageSource;
