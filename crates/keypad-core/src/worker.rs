//! Offline worker: one handler per lifecycle event.
//!
//! The host runtime constructs a single [`ServiceWorker`] and forwards its
//! install, activate, fetch and message events to it, awaiting each handler
//! before finalizing the event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::assets::AssetManifest;
use crate::cache::{ActivateReport, CacheStoreManager, InstallReport};
use crate::http::{Fetcher, Request};
use crate::policy::{FetchOutcome, RevalidationPolicy};

const CONTROLLER_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    /// Installed but waiting for older clients to go away.
    Waiting,
    Activating,
    Activated,
}

/// Control messages posted by pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl WorkerMessage {
    /// Parse a posted payload. Anything unrecognised is `None`.
    pub fn parse(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}

/// Sent to pages when this worker takes control of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerChange {
    pub bucket: String,
}

pub struct ServiceWorker {
    cache: CacheStoreManager,
    fetcher: Arc<dyn Fetcher>,
    manifest: Arc<AssetManifest>,
    policy: RevalidationPolicy,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    controller_tx: broadcast::Sender<ControllerChange>,
}

impl ServiceWorker {
    pub fn new(cache: CacheStoreManager, fetcher: Arc<dyn Fetcher>, manifest: AssetManifest) -> Self {
        let manifest = Arc::new(manifest);
        let policy = RevalidationPolicy::new(cache.clone(), Arc::clone(&fetcher), Arc::clone(&manifest));
        let (controller_tx, _) = broadcast::channel(CONTROLLER_CHANNEL_CAPACITY);
        Self {
            cache,
            fetcher,
            manifest,
            policy,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controller_tx,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
        debug!(?state, "Worker state changed");
    }

    pub fn cache(&self) -> &CacheStoreManager {
        &self.cache
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Pages subscribe here to learn when they should reload.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerChange> {
        self.controller_tx.subscribe()
    }

    /// Allow activation without waiting for existing clients to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Waiting {
            self.set_state(WorkerState::Installed);
        }
    }

    /// True once installed and allowed to activate immediately.
    pub fn ready_to_activate(&self) -> bool {
        self.state() == WorkerState::Installed && self.skip_waiting.load(Ordering::SeqCst)
    }

    pub async fn on_install(&self) -> InstallReport {
        self.set_state(WorkerState::Installing);
        self.skip_waiting();

        let report = self.cache.install(self.fetcher.as_ref(), &self.manifest).await;

        if self.skip_waiting.load(Ordering::SeqCst) {
            self.set_state(WorkerState::Installed);
        } else {
            self.set_state(WorkerState::Waiting);
        }
        report
    }

    pub async fn on_activate(&self) -> ActivateReport {
        self.set_state(WorkerState::Activating);
        let report = self.cache.activate().await;
        self.claim_clients();
        self.set_state(WorkerState::Activated);
        report
    }

    /// `None` means the request is not intercepted and should go to the network.
    pub async fn on_fetch(&self, request: &Request) -> Option<FetchOutcome> {
        self.policy.handle(request).await
    }

    /// Handle a posted control message. Returns whether it was recognised.
    pub fn on_message(&self, payload: &str) -> bool {
        match WorkerMessage::parse(payload) {
            Some(WorkerMessage::SkipWaiting) => {
                info!("Skip-waiting requested by page");
                self.skip_waiting();
                true
            }
            None => {
                debug!("Ignoring unrecognised worker message");
                false
            }
        }
    }

    fn claim_clients(&self) {
        let change = ControllerChange {
            bucket: self.cache.bucket().to_string(),
        };
        // No subscribers just means no open pages.
        let pages = self.controller_tx.send(change).unwrap_or(0);
        info!(bucket = %self.cache.bucket(), pages, "Worker took control of open pages");
    }
}

/// Page-side guard allowing at most one reload after a controller change.
#[derive(Debug, Default)]
pub struct ReloadGuard {
    reloaded: AtomicBool,
}

impl ReloadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time only.
    pub fn should_reload(&self) -> bool {
        !self.reloaded.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, MemoryStorage, DEFAULT_CACHE_PREFIX};
    use crate::policy::ResponseSource;
    use crate::testing::{url, MockFetcher};

    fn worker(storage: Arc<MemoryStorage>, fetcher: MockFetcher, version: &str) -> ServiceWorker {
        let manifest = AssetManifest::new(
            &url("https://app.test/"),
            &["index.html".to_string(), "app.js".to_string()],
            "index.html",
            "app.js",
        );
        ServiceWorker::new(
            CacheStoreManager::new(storage, DEFAULT_CACHE_PREFIX, version),
            Arc::new(fetcher),
            manifest,
        )
    }

    fn online() -> MockFetcher {
        MockFetcher::new()
            .ok("https://app.test/index.html", "<shell>")
            .ok("https://app.test/app.js", "js")
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            WorkerMessage::parse(r#"{"type":"SKIP_WAITING"}"#),
            Some(WorkerMessage::SkipWaiting)
        );
        assert_eq!(WorkerMessage::parse(r#"{"type":"OTHER"}"#), None);
        assert_eq!(WorkerMessage::parse("null"), None);
        assert_eq!(WorkerMessage::parse(""), None);
    }

    #[tokio::test]
    async fn test_install_makes_worker_ready() {
        let w = worker(Arc::new(MemoryStorage::new()), online(), "v4");
        assert_eq!(w.state(), WorkerState::Parsed);

        let report = w.on_install().await;

        assert_eq!(report.cached.len(), 2);
        assert!(w.ready_to_activate());
    }

    #[tokio::test]
    async fn test_activate_purges_and_notifies_pages() {
        let storage = Arc::new(MemoryStorage::new());
        storage.open("phone-keypad-v3").await.unwrap();
        let w = worker(storage.clone(), online(), "v4");
        let mut page = w.subscribe();

        w.on_install().await;
        let report = w.on_activate().await;

        assert_eq!(report.deleted, vec!["phone-keypad-v3".to_string()]);
        assert_eq!(w.state(), WorkerState::Activated);
        assert_eq!(
            page.recv().await.unwrap(),
            ControllerChange {
                bucket: "phone-keypad-v4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_message_releases_waiting_worker() {
        let w = worker(Arc::new(MemoryStorage::new()), online(), "v4");
        w.set_state(WorkerState::Waiting);
        w.skip_waiting.store(false, Ordering::SeqCst);

        assert!(!w.ready_to_activate());
        assert!(w.on_message(r#"{"type":"SKIP_WAITING"}"#));
        assert_eq!(w.state(), WorkerState::Installed);
        assert!(w.ready_to_activate());
    }

    #[tokio::test]
    async fn test_unknown_message_is_ignored() {
        let w = worker(Arc::new(MemoryStorage::new()), online(), "v4");
        assert!(!w.on_message(r#"{"type":"RELOAD"}"#));
        assert_eq!(w.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_fetch_after_install_works_offline() {
        let storage = Arc::new(MemoryStorage::new());
        let installer = worker(storage.clone(), online(), "v4");
        installer.on_install().await;
        installer.on_activate().await;

        // Same storage, network gone.
        let offline = worker(storage, MockFetcher::new(), "v4");
        let outcome = offline
            .on_fetch(&Request::navigate(url("https://app.test/")))
            .await
            .unwrap();
        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(outcome.response.text(), "<shell>");
        outcome.revalidation.unwrap().await.unwrap();

        let js = offline
            .on_fetch(&Request::get(url("https://app.test/app.js")))
            .await
            .unwrap();
        assert_eq!(js.source, ResponseSource::Cache);
        assert_eq!(js.response.text(), "js");
    }

    #[tokio::test]
    async fn test_page_reloads_once_for_repeated_controller_changes() {
        let w = worker(Arc::new(MemoryStorage::new()), online(), "v4");
        let mut page = w.subscribe();
        let guard = ReloadGuard::new();

        w.on_install().await;
        w.on_activate().await;
        w.on_activate().await;

        let mut reloads = 0;
        for _ in 0..2 {
            page.recv().await.unwrap();
            if guard.should_reload() {
                reloads += 1;
            }
        }
        assert_eq!(reloads, 1);
    }

    #[test]
    fn test_reload_guard_fires_once() {
        let guard = ReloadGuard::new();
        assert!(guard.should_reload());
        assert!(!guard.should_reload());
        assert!(!guard.should_reload());
    }
}
