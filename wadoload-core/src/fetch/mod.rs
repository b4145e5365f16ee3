//! Byte fetch strategies and the scheme router that picks between them.

pub mod file;
pub mod http;
pub mod router;

pub use file::{FileFetchConfig, FileFetcher};
pub use http::{HttpFetchConfig, HttpFetcher};
pub use router::SchemeRouter;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

/// Transport details reported alongside fetched bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetadata {
    /// Where the bytes came from: the request url or the resolved file path.
    pub source: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Raw bytes of one resource plus how they were obtained.
#[derive(Clone)]
pub struct FetchedBytes {
    pub bytes: Bytes,
    pub metadata: TransportMetadata,
}

impl fmt::Debug for FetchedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedBytes")
            .field("byte_len", &self.bytes.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Fetches the bytes a resource url names.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// `image_id` is the identifier whose load triggered the fetch; strategies
    /// may use it for logging or request decoration.
    async fn fetch(
        &self,
        url: &str,
        image_id: &str,
    ) -> Result<FetchedBytes, FetchError>;
}
