use std::{any::type_name_of_val, fmt, sync::Arc, time::Instant};

use tracing::{debug, warn};

use crate::{
    cache::DataSetCache,
    dataset::tags,
    error::{LoadError, Result},
    fetch::SchemeRouter,
    frame::extract_frame,
    image::{Decache, ImageFactory, LoadOptions, LoadedImage},
    image_id::ParsedImageId,
    registry::ImageLoaderRegistry,
};

/// Turns image ids into finished images.
///
/// Routes the id's scheme to a fetch strategy, resolves the data set through
/// the cache, cuts out the frame, hands it to the image factory and decorates
/// the result with its cache key, timings and decache hook. Clones share the
/// same cache.
#[derive(Clone)]
pub struct ImageLoader {
    router: SchemeRouter,
    cache: DataSetCache,
    factory: Arc<dyn ImageFactory>,
}

impl fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoader")
            .field("router", &self.router)
            .field("cache", &self.cache)
            .field("factory", &type_name_of_val(self.factory.as_ref()))
            .finish()
    }
}

impl ImageLoader {
    pub fn new(
        router: SchemeRouter,
        cache: DataSetCache,
        factory: Arc<dyn ImageFactory>,
    ) -> Self {
        Self {
            router,
            cache,
            factory,
        }
    }

    pub fn cache(&self) -> &DataSetCache {
        &self.cache
    }

    pub fn router(&self) -> &SchemeRouter {
        &self.router
    }

    /// Register this loader for every scheme the router resolves.
    pub fn register(&self, registry: &ImageLoaderRegistry) {
        for scheme in SchemeRouter::schemes() {
            registry.register_image_loader(scheme, Arc::new(self.clone()));
        }
    }

    /// Load the image `image_id` names.
    ///
    /// Fails with the error of the first stage that failed; nothing is
    /// retried.
    pub async fn load_image(
        &self,
        image_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedImage> {
        let result = self.run(image_id, options).await;
        if let Err(err) = &result {
            warn!(image_id, stage = err.stage(), error = %err, "image load failed");
        }
        result
    }

    async fn run(
        &self,
        image_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedImage> {
        let start = Instant::now();
        let parsed = ParsedImageId::parse(image_id)?;
        let strategy = self
            .router
            .resolve_strategy(&parsed.scheme)
            .ok_or_else(|| LoadError::UnsupportedScheme(parsed.scheme.clone()))?;

        let data_set = match self.cache.get(&parsed.url) {
            Some(data_set) => {
                debug!(image_id, url = %parsed.url, "data set cache hit");
                data_set
            }
            None => self.cache.load(&parsed.url, strategy, image_id).await?,
        };

        let transfer_syntax = data_set.string(tags::TRANSFER_SYNTAX_UID);
        let pixel_data = extract_frame(&data_set, parsed.frame_index())?;
        let load_end = start.elapsed();

        let image = self
            .factory
            .create_image(
                image_id,
                pixel_data,
                transfer_syntax.as_deref(),
                options,
                &data_set,
            )
            .await?;
        let total_time = start.elapsed();

        debug!(
            image_id,
            load_ms = load_end.as_secs_f64() * 1000.0,
            total_ms = total_time.as_secs_f64() * 1000.0,
            "image loaded"
        );

        Ok(LoadedImage {
            image,
            data: data_set,
            shared_cache_key: parsed.url.clone(),
            load_time: load_end,
            total_time,
            decache: Decache::new(parsed.url, self.cache.clone()),
        })
    }
}
