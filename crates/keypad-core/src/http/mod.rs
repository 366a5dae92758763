//! HTTP request/response model and the network seam.
//!
//! This module provides:
//! - `Request` / `Response`: plain values the worker routes and caches
//! - `Fetcher`: async network access trait
//! - `HttpFetcher`: the `reqwest` implementation used by real hosts

pub mod fetcher;
pub mod types;

pub use fetcher::{Fetcher, HttpFetcher, DEFAULT_TIMEOUT_SECS};
pub use types::{CacheMode, Destination, Request, RequestMode, Response, OFFLINE_HTML};
