//! Network access seam.
//!
//! The worker never talks to `reqwest` directly; it goes through [`Fetcher`]
//! so hosts and tests can substitute their own transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::debug;

use super::types::{CacheMode, Request, Response};
use crate::error::FetchError;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are returned as `Ok`; only
    /// transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// `reqwest`-backed fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidRequest(format!("method {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.cache == CacheMode::NoCache {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder.send().await.map_err(FetchError::network)?;
        let status = response.status();

        let mut result = Response::new(status.as_u16(), Vec::new())
            .with_status_text(status.canonical_reason().unwrap_or_default());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                result = result.with_header(name.as_str(), value);
            }
        }
        result.body = response.bytes().await.map_err(FetchError::network)?.to_vec();

        debug!(url = %request.url, status = result.status, bytes = result.body.len(), "Fetched");
        Ok(result)
    }
}
