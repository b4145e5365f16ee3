//! Host-side table of image loaders keyed by scheme.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{LoadError, Result},
    image::{LoadOptions, LoadedImage},
    loader::ImageLoader,
};

/// Entry point a registry dispatches to.
#[async_trait]
pub trait ImageLoad: Send + Sync {
    async fn load_image(
        &self,
        image_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedImage>;
}

#[async_trait]
impl ImageLoad for ImageLoader {
    async fn load_image(
        &self,
        image_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedImage> {
        ImageLoader::load_image(self, image_id, options).await
    }
}

/// Routes image ids to the loader registered for their scheme.
#[derive(Clone, Default)]
pub struct ImageLoaderRegistry {
    loaders: Arc<RwLock<HashMap<String, Arc<dyn ImageLoad>>>>,
}

impl fmt::Debug for ImageLoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoaderRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

impl ImageLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader` for `scheme`, returning the loader it replaces.
    pub fn register_image_loader(
        &self,
        scheme: impl Into<String>,
        loader: Arc<dyn ImageLoad>,
    ) -> Option<Arc<dyn ImageLoad>> {
        self.loaders.write().insert(scheme.into(), loader)
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.loaders.read().contains_key(scheme)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<_> = self.loaders.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    pub async fn load_image(
        &self,
        image_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedImage> {
        let (scheme, _) = image_id
            .split_once(':')
            .ok_or_else(|| LoadError::InvalidImageId {
                image_id: image_id.to_owned(),
                reason: "missing ':' between scheme and url".to_owned(),
            })?;

        let loader = self
            .loaders
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| LoadError::UnsupportedScheme(scheme.to_owned()))?;

        loader.load_image(image_id, options).await
    }
}
