//! Image types produced by a load, and the factory seam that builds them.

pub mod native;

pub use native::NativeImageFactory;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{cache::DataSetCache, dataset::DataSet, error::ConstructionError};

/// Caller-supplied options, forwarded untouched to the image factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadOptions(Map<String, Value>);

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for LoadOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Image as built by an [`ImageFactory`], before the loader decorates it.
#[derive(Clone, PartialEq)]
pub struct DecodedImage {
    pub image_id: String,
    pub rows: u16,
    pub columns: u16,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub pixel_representation: u16,
    pub photometric_interpretation: Option<String>,
    pub transfer_syntax: Option<String>,
    pub slope: f64,
    pub intercept: f64,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub min_pixel_value: Option<i32>,
    pub max_pixel_value: Option<i32>,
    pub pixel_data: Bytes,
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("image_id", &self.image_id)
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("samples_per_pixel", &self.samples_per_pixel)
            .field("bits_allocated", &self.bits_allocated)
            .field("photometric_interpretation", &self.photometric_interpretation)
            .field("transfer_syntax", &self.transfer_syntax)
            .field("pixel_bytes", &self.pixel_data.len())
            .finish_non_exhaustive()
    }
}

impl DecodedImage {
    /// Single-sample image with identity rescale and no windowing.
    pub fn new(
        image_id: impl Into<String>,
        rows: u16,
        columns: u16,
        bits_allocated: u16,
        pixel_data: Bytes,
    ) -> Self {
        Self {
            image_id: image_id.into(),
            rows,
            columns,
            samples_per_pixel: 1,
            bits_allocated,
            pixel_representation: 0,
            photometric_interpretation: None,
            transfer_syntax: None,
            slope: 1.0,
            intercept: 0.0,
            window_center: None,
            window_width: None,
            min_pixel_value: None,
            max_pixel_value: None,
            pixel_data,
        }
    }
}

/// Builds an image from one frame's pixel bytes.
#[async_trait]
pub trait ImageFactory: Send + Sync {
    async fn create_image(
        &self,
        image_id: &str,
        pixel_data: Bytes,
        transfer_syntax: Option<&str>,
        options: &LoadOptions,
        data_set: &DataSet,
    ) -> Result<DecodedImage, ConstructionError>;
}

/// Evicts the data set an image was cut from.
///
/// Bound to the image's url and the cache it was loaded through. Calling it
/// more than once is harmless.
#[derive(Clone)]
pub struct Decache {
    url: String,
    cache: DataSetCache,
}

impl fmt::Debug for Decache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decache").field("url", &self.url).finish()
    }
}

impl Decache {
    pub(crate) fn new(url: String, cache: DataSetCache) -> Self {
        Self { url, cache }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn decache(&self) {
        self.cache.unload(&self.url);
    }
}

/// A finished load: the factory's image plus the data set it came from,
/// timings, and its decache hook.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: DecodedImage,
    pub data: Arc<DataSet>,
    /// The resource url; images cut from the same data set share it.
    pub shared_cache_key: String,
    /// Load start until the frame's pixel data was available.
    pub load_time: Duration,
    /// Load start until the image was ready.
    pub total_time: Duration,
    pub decache: Decache,
}

impl LoadedImage {
    pub fn image_id(&self) -> &str {
        &self.image.image_id
    }

    pub fn load_time_in_ms(&self) -> f64 {
        self.load_time.as_secs_f64() * 1000.0
    }

    pub fn total_time_in_ms(&self) -> f64 {
        self.total_time.as_secs_f64() * 1000.0
    }

    /// Evict this image's data set from the cache.
    pub fn decache(&self) {
        self.decache.decache();
    }
}
