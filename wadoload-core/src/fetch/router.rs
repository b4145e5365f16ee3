use std::{any::type_name_of_val, fmt, sync::Arc};

use super::{
    FetchStrategy, FileFetchConfig, FileFetcher, HttpFetchConfig, HttpFetcher,
};
use crate::error::FetchError;

/// Schemes whose urls are fetched over the network.
pub const NETWORK_SCHEMES: [&str; 2] = ["dicomweb", "wadouri"];
/// Schemes whose urls name local files.
pub const FILE_SCHEMES: [&str; 1] = ["dicomfile"];

/// Fixed scheme → fetch strategy table.
///
/// The strategies are chosen when the router is built and never change;
/// every lookup for a scheme hands out the same strategy.
#[derive(Clone)]
pub struct SchemeRouter {
    network: Arc<dyn FetchStrategy>,
    file: Arc<dyn FetchStrategy>,
}

impl fmt::Debug for SchemeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeRouter")
            .field("network", &type_name_of_val(self.network.as_ref()))
            .field("file", &type_name_of_val(self.file.as_ref()))
            .finish()
    }
}

impl SchemeRouter {
    pub fn new(
        network: Arc<dyn FetchStrategy>,
        file: Arc<dyn FetchStrategy>,
    ) -> Self {
        Self { network, file }
    }

    /// Router over the default [`HttpFetcher`] and [`FileFetcher`].
    pub fn from_config(
        http: &HttpFetchConfig,
        file: &FileFetchConfig,
    ) -> Result<Self, FetchError> {
        Ok(Self::new(
            Arc::new(HttpFetcher::new(http)?),
            Arc::new(FileFetcher::new(file)),
        ))
    }

    /// Every scheme this router resolves.
    pub fn schemes() -> impl Iterator<Item = &'static str> {
        NETWORK_SCHEMES.into_iter().chain(FILE_SCHEMES)
    }

    pub fn resolve_strategy(&self, scheme: &str) -> Option<Arc<dyn FetchStrategy>> {
        if NETWORK_SCHEMES.iter().any(|known| *known == scheme) {
            Some(Arc::clone(&self.network))
        } else if FILE_SCHEMES.iter().any(|known| *known == scheme) {
            Some(Arc::clone(&self.file))
        } else {
            None
        }
    }
}
