//! Request and response value types shared by the worker, the cache and the fetchers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Body of the synthesized offline page.
pub const OFFLINE_HTML: &str = "<!doctype html><title>Offline</title><h1>Offline</h1>";

const SERVICE_UNAVAILABLE: u16 = 503;
const SERVICE_UNAVAILABLE_TEXT: &str = "Service Unavailable";

/// How the request was initiated by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Manifest,
}

/// HTTP cache behaviour requested for the outgoing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    #[default]
    Default,
    /// Revalidate with the origin, bypassing intermediate caches.
    NoCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub cache: CacheMode,
}

impl Request {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            mode: RequestMode::default(),
            destination: Destination::default(),
            headers: BTreeMap::new(),
            cache: CacheMode::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// A top-level page load, as a browser issues when the user opens the app.
    pub fn navigate(url: Url) -> Self {
        Self::get(url)
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Document)
            .with_header("accept", "text/html,application/xhtml+xml")
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// The cache key for this request: its absolute URL.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Stored as base64 so binary assets stay compact on disk.
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    /// When the response was produced or stored.
    pub received_at: DateTime<Utc>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_status_text(mut self, text: &str) -> Self {
        self.status_text = text.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Empty body, status 503.
    pub fn service_unavailable() -> Self {
        Self::new(SERVICE_UNAVAILABLE, Vec::new()).with_status_text(SERVICE_UNAVAILABLE_TEXT)
    }

    /// Minimal HTML page served for navigations when nothing is cached and the network is down.
    pub fn offline_page() -> Self {
        Self::new(SERVICE_UNAVAILABLE, OFFLINE_HTML)
            .with_status_text(SERVICE_UNAVAILABLE_TEXT)
            .with_header("content-type", "text/html; charset=utf-8")
    }

    /// True for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
