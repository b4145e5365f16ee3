use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{FetchStrategy, FetchedBytes, TransportMetadata};
use crate::error::FetchError;

/// Network fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpFetchConfig {
    /// Whole-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Value of the `Accept` header sent with every request.
    pub accept: String,
    /// Extra headers added to every request, e.g. an authorization token
    /// injected by the host.
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpFetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            accept: "application/dicom".to_owned(),
            headers: BTreeMap::new(),
        }
    }
}

/// Fetches resources over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl HttpFetcher {
    pub fn new(config: &HttpFetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                FetchError::InvalidConfig(format!(
                    "failed to create HTTP client: {e}"
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, header_value(&config.accept)?);
        // Avoid compressed, range-susceptible responses for binary payloads
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                FetchError::InvalidConfig(format!("invalid header name {name}: {e}"))
            })?;
            headers.insert(name, header_value(value)?);
        }

        Ok(Self { client, headers })
    }

    /// Use a preconfigured client; no default headers are added.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|e| {
        FetchError::InvalidConfig(format!("invalid header value: {e}"))
    })
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        image_id: &str,
    ) -> Result<FetchedBytes, FetchError> {
        debug!(url, image_id, "fetching data set over http");

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_owned(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "data set request rejected");
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let expected_len = response.content_length();
        let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_owned(),
            message: format!("failed to read response body: {e}"),
        })?;

        if let Some(content_len) = expected_len
            && bytes.len() as u64 != content_len
        {
            return Err(FetchError::LengthMismatch {
                url: url.to_owned(),
                expected: content_len,
                actual: bytes.len() as u64,
            });
        }

        Ok(FetchedBytes {
            metadata: TransportMetadata {
                source: url.to_owned(),
                content_type,
                content_length: Some(bytes.len() as u64),
            },
            bytes,
        })
    }
}
