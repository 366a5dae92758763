use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::CacheStorage;
use crate::assets::AssetManifest;
use crate::error::{CacheError, FetchError};
use crate::http::{Fetcher, Request, Response};

/// Default bucket name prefix.
pub const DEFAULT_CACHE_PREFIX: &str = "phone-keypad";

/// Bump whenever the deployed asset set changes so old buckets get purged.
pub const DEFAULT_CACHE_VERSION: &str = "v4";

/// `"{prefix}-{version}"`.
pub fn bucket_name(prefix: &str, version: &str) -> String {
    format!("{}-{}", prefix, version)
}

/// Outcome of populating the bucket at install time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<Url>,
    /// Assets that could not be fetched. They are not retried.
    pub skipped: Vec<Url>,
    /// True when the single atomic batch succeeded.
    pub batched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
}

/// Owns the one current versioned bucket.
///
/// Read and write failures never escape: a failed lookup is a miss and a
/// failed store is logged and dropped.
#[derive(Clone)]
pub struct CacheStoreManager {
    storage: Arc<dyn CacheStorage>,
    bucket: String,
}

impl CacheStoreManager {
    pub fn new(storage: Arc<dyn CacheStorage>, prefix: &str, version: &str) -> Self {
        Self {
            storage,
            bucket: bucket_name(prefix, version),
        }
    }

    /// Name of the current bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Open the current bucket and precache the manifest.
    ///
    /// Tries one all-or-nothing batch first. If any asset fails, every asset
    /// is added on its own and the failures are skipped.
    pub async fn install(&self, fetcher: &dyn Fetcher, manifest: &AssetManifest) -> InstallReport {
        if let Err(e) = self.storage.open(&self.bucket).await {
            warn!(bucket = %self.bucket, error = %e, "Failed to open cache bucket");
        }

        let urls = manifest.urls();
        match self.add_all(fetcher, &urls).await {
            Ok(()) => {
                info!(bucket = %self.bucket, assets = urls.len(), "Precached all assets");
                return InstallReport {
                    cached: urls,
                    skipped: Vec::new(),
                    batched: true,
                };
            }
            Err(e) => {
                debug!(bucket = %self.bucket, error = %e, "Batch precache failed, adding assets individually");
            }
        }

        let results = join_all(urls.iter().map(|url| self.add(fetcher, url))).await;

        let mut report = InstallReport::default();
        for (url, result) in urls.into_iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping asset that failed to precache");
                    report.skipped.push(url);
                }
            }
        }
        info!(
            bucket = %self.bucket,
            cached = report.cached.len(),
            skipped = report.skipped.len(),
            "Precached assets individually"
        );
        report
    }

    /// Delete every bucket other than the current one.
    pub async fn activate(&self) -> ActivateReport {
        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate cache buckets");
                return ActivateReport::default();
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|n| *n != self.bucket).collect();
        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut report = ActivateReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(bucket = %name, "Deleted stale cache bucket");
                    report.deleted.push(name);
                }
                Err(e) => warn!(bucket = %name, error = %e, "Failed to delete stale cache bucket"),
            }
        }
        report
    }

    /// Cached response for the exact request URL.
    pub async fn get(&self, request: &Request) -> Option<Response> {
        self.get_key(request.cache_key()).await
    }

    pub async fn get_url(&self, url: &Url) -> Option<Response> {
        self.get_key(url.as_str()).await
    }

    async fn get_key(&self, key: &str) -> Option<Response> {
        match self.storage.lookup(&self.bucket, key).await {
            Ok(found) => found,
            Err(e) => {
                debug!(key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Store a 2xx response under the request URL. Returns whether it was stored.
    pub async fn put(&self, request: &Request, response: &Response) -> bool {
        self.put_key(request.cache_key(), response).await
    }

    pub async fn put_url(&self, url: &Url, response: &Response) -> bool {
        self.put_key(url.as_str(), response).await
    }

    async fn put_key(&self, key: &str, response: &Response) -> bool {
        if !response.is_ok() {
            debug!(key, status = response.status, "Not caching unsuccessful response");
            return false;
        }
        match self.storage.put(&self.bucket, key, response.clone()).await {
            Ok(()) => true,
            Err(e) => {
                debug!(key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Fetch one URL and store it. Non-2xx responses are errors.
    pub async fn add(&self, fetcher: &dyn Fetcher, url: &Url) -> Result<(), CacheError> {
        let response = fetch_ok(fetcher, url).await?;
        self.storage
            .put(&self.bucket, url.as_str(), response)
            .await?;
        Ok(())
    }

    /// Fetch every URL and store them together, or store nothing.
    pub async fn add_all(&self, fetcher: &dyn Fetcher, urls: &[Url]) -> Result<(), CacheError> {
        let fetched = join_all(urls.iter().map(|url| fetch_ok(fetcher, url))).await;

        let mut entries = Vec::with_capacity(urls.len());
        for (url, result) in urls.iter().zip(fetched) {
            entries.push((url.to_string(), result?));
        }
        self.storage.put_all(&self.bucket, entries).await?;
        Ok(())
    }
}

async fn fetch_ok(fetcher: &dyn Fetcher, url: &Url) -> Result<Response, FetchError> {
    let response = fetcher.fetch(&Request::get(url.clone())).await?;
    if !response.is_ok() {
        return Err(FetchError::BadStatus {
            status: response.status,
            url: url.to_string(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::DEFAULT_ASSETS;
    use crate::cache::MemoryStorage;
    use crate::testing::{url, FailingStorage, MockFetcher};

    fn manifest(paths: &[&str]) -> AssetManifest {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        AssetManifest::new(&url("https://app.test/keypad/"), &paths, "index.html", "icon.png")
    }

    fn manager(storage: &Arc<MemoryStorage>, version: &str) -> CacheStoreManager {
        CacheStoreManager::new(storage.clone(), DEFAULT_CACHE_PREFIX, version)
    }

    #[test]
    fn test_bucket_name() {
        assert_eq!(bucket_name("phone-keypad", "v4"), "phone-keypad-v4");
    }

    #[tokio::test]
    async fn test_install_caches_every_asset_in_one_batch() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let fetcher = MockFetcher::new()
            .ok("https://app.test/keypad/index.html", "<html>")
            .ok("https://app.test/keypad/app.js", "js");

        let report = cache
            .install(&fetcher, &manifest(&["index.html", "app.js"]))
            .await;

        assert!(report.batched);
        assert_eq!(report.cached.len(), 2);
        assert!(report.skipped.is_empty());
        let shell = cache
            .get_url(&url("https://app.test/keypad/index.html"))
            .await
            .unwrap();
        assert_eq!(shell.text(), "<html>");
    }

    #[tokio::test]
    async fn test_install_survives_one_unfetchable_asset() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let fetcher = MockFetcher::new()
            .ok("https://app.test/keypad/index.html", "<html>")
            .fail("https://app.test/keypad/missing.png")
            .ok("https://app.test/keypad/app.js", "js");

        let report = cache
            .install(&fetcher, &manifest(&["index.html", "missing.png", "app.js"]))
            .await;

        assert!(!report.batched);
        assert_eq!(report.cached.len(), 2);
        assert_eq!(
            report.skipped,
            vec![url("https://app.test/keypad/missing.png")]
        );
        assert!(cache.get_url(&url("https://app.test/keypad/app.js")).await.is_some());
        assert!(cache
            .get_url(&url("https://app.test/keypad/missing.png"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_install_treats_error_status_as_failure() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let fetcher = MockFetcher::new()
            .ok("https://app.test/keypad/index.html", "<html>")
            .status("https://app.test/keypad/gone.png", 404);

        let report = cache
            .install(&fetcher, &manifest(&["index.html", "gone.png"]))
            .await;

        assert_eq!(report.skipped, vec![url("https://app.test/keypad/gone.png")]);
        assert!(cache.get_url(&url("https://app.test/keypad/gone.png")).await.is_none());
    }

    #[tokio::test]
    async fn test_skipped_assets_are_not_retried() {
        // Known gap: a failed asset stays missing until the next install.
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let fetcher = MockFetcher::new()
            .ok("https://app.test/keypad/index.html", "<html>")
            .fail("https://app.test/keypad/missing.png");

        cache
            .install(&fetcher, &manifest(&["index.html", "missing.png"]))
            .await;

        // Once by the batch, once individually.
        assert_eq!(fetcher.calls_to("https://app.test/keypad/missing.png"), 2);
    }

    #[tokio::test]
    async fn test_install_on_broken_storage_skips_everything() {
        let cache = CacheStoreManager::new(Arc::new(FailingStorage), DEFAULT_CACHE_PREFIX, "v4");
        let manifest = AssetManifest::with_defaults(&url("https://app.test/keypad/"));
        let mut fetcher = MockFetcher::new();
        for url in manifest.urls() {
            fetcher = fetcher.ok(url.as_str(), "asset");
        }

        let report = cache.install(&fetcher, &manifest).await;

        assert!(!report.batched);
        assert!(report.cached.is_empty());
        assert_eq!(report.skipped.len(), DEFAULT_ASSETS.len());
        assert!(cache.activate().await.deleted.is_empty());
        assert!(cache.get_url(&manifest.shell_url()).await.is_none());
    }

    #[tokio::test]
    async fn test_activate_leaves_only_current_bucket() {
        let storage = Arc::new(MemoryStorage::new());
        storage.open("phone-keypad-v2").await.unwrap();
        storage.open("phone-keypad-v3").await.unwrap();
        storage.open("something-else").await.unwrap();

        let cache = manager(&storage, "v4");
        cache.install(&MockFetcher::new(), &manifest(&[])).await;
        let report = cache.activate().await;

        assert_eq!(report.deleted.len(), 3);
        assert_eq!(storage.keys().await.unwrap(), vec!["phone-keypad-v4".to_string()]);
    }

    #[tokio::test]
    async fn test_successive_activations_keep_latest_version() {
        let storage = Arc::new(MemoryStorage::new());
        for version in ["v1", "v2", "v3"] {
            let cache = manager(&storage, version);
            cache.install(&MockFetcher::new(), &manifest(&[])).await;
            cache.activate().await;
            assert_eq!(storage.keys().await.unwrap(), vec![cache.bucket().to_string()]);
        }
    }

    #[tokio::test]
    async fn test_put_only_stores_success() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let req = Request::get(url("https://app.test/keypad/a.css"));

        assert!(!cache.put(&req, &Response::new(500, "boom")).await);
        assert!(cache.get(&req).await.is_none());

        assert!(cache.put(&req, &Response::new(200, "a{}")).await);
        assert_eq!(cache.get(&req).await.unwrap().text(), "a{}");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        let req = Request::get(url("https://app.test/keypad/a.css"));
        let res = Response::new(200, "a{}");

        cache.put(&req, &res).await;
        let once_keys = storage.entries(cache.bucket()).await.unwrap();
        let once = cache.get(&req).await;

        cache.put(&req, &res).await;
        assert_eq!(storage.entries(cache.bucket()).await.unwrap(), once_keys);
        assert_eq!(cache.get(&req).await, once);
    }

    #[tokio::test]
    async fn test_get_is_exact_url_match() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = manager(&storage, "v4");
        cache
            .put_url(&url("https://app.test/keypad/a.css"), &Response::new(200, "a"))
            .await;
        assert!(cache.get_url(&url("https://app.test/keypad/a.css?v=2")).await.is_none());
        assert!(cache.get_url(&url("https://app.test/a.css")).await.is_none());
    }
}
