//! Shared fakes for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use url::Url;

use crate::cache::CacheStorage;
use crate::error::{ClipboardError, FetchError, StorageError};
use crate::http::{Fetcher, Request, Response};
use crate::typing::{ClipboardSource, KeypadSurface};

pub(crate) fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[derive(Clone)]
enum Route {
    Respond(Response),
    Fail,
}

/// Canned network. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Request>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ok(self, url: &str, body: &str) -> Self {
        self.set_ok(url, body);
        self
    }

    pub(crate) fn status(self, url: &str, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Respond(Response::new(status, "")));
        self
    }

    pub(crate) fn fail(self, url: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Fail);
        self
    }

    /// Block every fetch until `release` is called. Calls are still recorded.
    pub(crate) fn held(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub(crate) fn set_ok(&self, url: &str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Respond(Response::new(200, body)));
    }

    pub(crate) fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            let _ = gate.acquire().await;
        }
        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail) | None => Err(FetchError::Network(format!(
                "unreachable: {}",
                request.url
            ))),
        }
    }
}

/// Storage where every operation fails, like a quota-exceeded or unavailable cache.
pub(crate) struct FailingStorage;

fn unavailable<T>() -> Result<T, StorageError> {
    Err(StorageError::Unavailable("storage offline".to_string()))
}

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, _bucket: &str) -> Result<(), StorageError> {
        unavailable()
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        unavailable()
    }

    async fn delete(&self, _bucket: &str) -> Result<bool, StorageError> {
        unavailable()
    }

    async fn lookup(&self, _bucket: &str, _key: &str) -> Result<Option<Response>, StorageError> {
        unavailable()
    }

    async fn put(&self, _bucket: &str, _key: &str, _response: Response) -> Result<(), StorageError> {
        unavailable()
    }

    async fn put_all(
        &self,
        _bucket: &str,
        _entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError> {
        unavailable()
    }

    async fn entries(&self, _bucket: &str) -> Result<Vec<String>, StorageError> {
        unavailable()
    }
}

/// Clipboard returning fixed text, or denying access.
pub(crate) struct FixedClipboard(pub(crate) Option<String>);

#[async_trait]
impl ClipboardSource for FixedClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        self.0.clone().ok_or(ClipboardError::Denied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SurfaceEvent {
    Append(char),
    Pulse(char),
    Active(bool),
    Nudge,
}

/// Keypad that records every call.
#[derive(Default)]
pub(crate) struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub(crate) fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn typed(&self) -> String {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Append(c) => Some(*c),
                _ => None,
            })
            .collect()
    }
}

impl KeypadSurface for RecordingSurface {
    fn append(&self, ch: char) {
        self.events.lock().unwrap().push(SurfaceEvent::Append(ch));
    }

    fn pulse_key(&self, ch: char) {
        self.events.lock().unwrap().push(SurfaceEvent::Pulse(ch));
    }

    fn set_typing_active(&self, active: bool) {
        self.events.lock().unwrap().push(SurfaceEvent::Active(active));
    }

    fn nudge(&self) {
        self.events.lock().unwrap().push(SurfaceEvent::Nudge);
    }
}
