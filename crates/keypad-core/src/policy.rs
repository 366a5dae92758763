//! Per-request routing between cache and network.
//!
//! | Class               | Strategy                                      |
//! |---------------------|-----------------------------------------------|
//! | Navigation          | cached shell now, refresh it in the background |
//! | Same-origin static  | cache first, then network                      |
//! | Cross-origin        | network only, never cached                     |
//! | Non-GET             | not intercepted                                |

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::assets::AssetManifest;
use crate::cache::CacheStoreManager;
use crate::http::{CacheMode, Destination, Fetcher, Request, RequestMode, Response};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not a GET; goes straight to the network.
    Bypass,
    Navigation,
    SameOriginStatic,
    CrossOrigin,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// A substitute: the fallback icon or an empty 503.
    Fallback,
    /// The synthesized offline page.
    Offline,
}

pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
    /// Background shell refresh, if one was started. Hosts may await it to
    /// keep the worker alive; the response never depends on it.
    pub revalidation: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            revalidation: None,
        }
    }
}

pub fn is_navigation(request: &Request) -> bool {
    request.mode == RequestMode::Navigate
        || request
            .header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
}

/// Images by declared destination or by file extension.
pub fn is_image_request(request: &Request) -> bool {
    if request.destination == Destination::Image {
        return true;
    }
    request
        .url
        .path()
        .rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

pub fn classify(request: &Request, manifest: &AssetManifest) -> RequestClass {
    if !request.is_get() {
        RequestClass::Bypass
    } else if is_navigation(request) {
        RequestClass::Navigation
    } else if request.url.origin() == manifest.origin().origin() {
        RequestClass::SameOriginStatic
    } else {
        RequestClass::CrossOrigin
    }
}

#[derive(Clone)]
pub struct RevalidationPolicy {
    cache: CacheStoreManager,
    fetcher: Arc<dyn Fetcher>,
    manifest: Arc<AssetManifest>,
}

impl RevalidationPolicy {
    pub fn new(
        cache: CacheStoreManager,
        fetcher: Arc<dyn Fetcher>,
        manifest: Arc<AssetManifest>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            manifest,
        }
    }

    /// Route a request. `None` means the request is not intercepted.
    pub async fn handle(&self, request: &Request) -> Option<FetchOutcome> {
        let class = classify(request, &self.manifest);
        debug!(url = %request.url, method = %request.method, ?class, "Routing request");
        match class {
            RequestClass::Bypass => None,
            RequestClass::Navigation => Some(self.handle_navigation(request).await),
            RequestClass::SameOriginStatic => Some(self.cache_first(request).await),
            RequestClass::CrossOrigin => Some(self.pass_through(request).await),
        }
    }

    /// Stale-while-revalidate on the shell document.
    pub async fn handle_navigation(&self, request: &Request) -> FetchOutcome {
        let shell_url = self.manifest.shell_url();

        if let Some(cached) = self.cache.get_url(&shell_url).await {
            let mut outcome = FetchOutcome::new(cached, ResponseSource::Cache);
            outcome.revalidation = Some(self.spawn_shell_refresh());
            return outcome;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() && request.url.origin() == self.manifest.origin().origin() {
                    self.cache.put_url(&shell_url, &response).await;
                }
                FetchOutcome::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation fetch failed");
                match self.cache.get_url(&shell_url).await {
                    Some(cached) => FetchOutcome::new(cached, ResponseSource::Cache),
                    None => FetchOutcome::new(Response::offline_page(), ResponseSource::Offline),
                }
            }
        }
    }

    pub async fn cache_first(&self, request: &Request) -> FetchOutcome {
        if let Some(cached) = self.cache.get(request).await {
            return FetchOutcome::new(cached, ResponseSource::Cache);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.cache.put(request, &response).await;
                FetchOutcome::new(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Static fetch failed");
                if is_image_request(request) {
                    if let Some(icon) = self.cache.get_url(&self.manifest.fallback_icon_url()).await {
                        return FetchOutcome::new(icon, ResponseSource::Fallback);
                    }
                }
                FetchOutcome::new(Response::service_unavailable(), ResponseSource::Fallback)
            }
        }
    }

    pub async fn pass_through(&self, request: &Request) -> FetchOutcome {
        match self.fetcher.fetch(request).await {
            Ok(response) => FetchOutcome::new(response, ResponseSource::Network),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cross-origin fetch failed");
                FetchOutcome::new(Response::service_unavailable(), ResponseSource::Fallback)
            }
        }
    }

    fn spawn_shell_refresh(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let shell_url = self.manifest.shell_url();

        tokio::spawn(async move {
            let request = Request::get(shell_url.clone()).with_cache(CacheMode::NoCache);
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    if cache.put_url(&shell_url, &response).await {
                        debug!(url = %shell_url, "Refreshed cached shell");
                    }
                }
                Ok(response) => {
                    debug!(url = %shell_url, status = response.status, "Shell refresh returned error status");
                }
                Err(e) => debug!(url = %shell_url, error = %e, "Shell refresh failed"),
            }
        })
    }
}
