//! Configuration for the wadoload image loader.
//!
//! Loads [`LoaderConfig`] from files or the environment, turns it into a
//! ready [`wadoload_core::ImageLoader`], and sets up logging for the
//! `wadoload` binary.

pub mod logging;
pub mod models;

pub use logging::init_tracing;
pub use models::{CacheConfig, ConfigFormat, LoaderConfig, LoaderConfigSource};
