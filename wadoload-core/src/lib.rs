//! # wadoload core
//!
//! Asynchronous loader for DICOM images addressed by `wadouri`, `dicomweb`
//! and `dicomfile` image ids.
//!
//! ## Overview
//!
//! A load resolves an image id in five steps:
//!
//! - **Routing**: the id's scheme selects a fetch strategy ([`fetch`]).
//! - **Caching**: the resource is fetched and parsed at most once at a time
//!   and kept until it is unloaded ([`cache`]).
//! - **Extraction**: the requested frame is cut from encapsulated or native
//!   pixel data ([`frame`]).
//! - **Construction**: an [`ImageFactory`] turns the frame into an image.
//! - **Decoration**: the image gets its cache key, timings and a
//!   [`Decache`] hook ([`loader`]).
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wadoload_core::{
//!     DataSetCache, ImageLoader, ImageLoaderRegistry, LoadOptions,
//!     NativeImageFactory,
//!     fetch::{FileFetchConfig, HttpFetchConfig, SchemeRouter},
//! };
//!
//! async fn load() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = SchemeRouter::from_config(
//!         &HttpFetchConfig::default(),
//!         &FileFetchConfig::default(),
//!     )?;
//!     let loader = ImageLoader::new(
//!         router,
//!         DataSetCache::default(),
//!         Arc::new(NativeImageFactory),
//!     );
//!
//!     let registry = ImageLoaderRegistry::new();
//!     loader.register(&registry);
//!
//!     let image = registry
//!         .load_image("dicomfile:/data/ct.dcm?frame=0", &LoadOptions::default())
//!         .await?;
//!     println!("{} ms", image.total_time_in_ms());
//!     image.decache();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod image;
pub mod image_id;
pub mod loader;
pub mod registry;

pub use cache::{CacheAction, CacheEvent, CacheInfo, DataSetCache, SingleFlightStats};
pub use dataset::{DataSet, DataSetParser, Part10Parser, Tag};
pub use error::{
    ConstructionError, ExtractionError, FetchError, LoadError, ParseError, Result,
};
pub use fetch::{FetchStrategy, FetchedBytes, SchemeRouter, TransportMetadata};
pub use frame::{PixelDataLayout, extract_frame, pixel_data_layout};
pub use image::{
    Decache, DecodedImage, ImageFactory, LoadOptions, LoadedImage,
    NativeImageFactory,
};
pub use image_id::ParsedImageId;
pub use loader::ImageLoader;
pub use registry::{ImageLoad, ImageLoaderRegistry};
