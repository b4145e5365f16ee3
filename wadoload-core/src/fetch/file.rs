use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FetchStrategy, FetchedBytes, TransportMetadata};
use crate::error::FetchError;

/// Local file fetch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileFetchConfig {
    /// Directory relative urls are resolved against. Absolute urls ignore it.
    pub root: Option<PathBuf>,
}

/// Reads resources from the local filesystem. The url is a path.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new(config: &FileFetchConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl FetchStrategy for FileFetcher {
    async fn fetch(
        &self,
        url: &str,
        image_id: &str,
    ) -> Result<FetchedBytes, FetchError> {
        let path = self.resolve(url);
        debug!(path = %path.display(), image_id, "reading data set from disk");

        let contents =
            tokio::fs::read(&path)
                .await
                .map_err(|e| FetchError::Io {
                    kind: e.kind(),
                    message: e.to_string(),
                    path: path.clone(),
                })?;

        Ok(FetchedBytes {
            metadata: TransportMetadata {
                source: path.display().to_string(),
                content_type: None,
                content_length: Some(contents.len() as u64),
            },
            bytes: Bytes::from(contents),
        })
    }
}
