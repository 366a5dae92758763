//! Core library for the phone keypad app.
//!
//! Two asynchronous subsystems live here:
//! - the offline worker (`worker`, `policy`, `cache`, `assets`), which
//!   precaches a versioned asset set and routes requests between cache and
//!   network
//! - the clipboard typing sequencer (`typing`), which replays a copied phone
//!   number onto the keypad with fixed timing
//!
//! Presentation is left to the host through the `KeypadSurface` and
//! `ClipboardSource` traits.

pub mod assets;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod dialer;
pub mod error;
pub mod http;
pub mod policy;
pub mod typing;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use assets::AssetManifest;
pub use cache::{CacheStorage, CacheStoreManager, DiskStorage, MemoryStorage};
pub use calibration::{Calibration, CalibrationStore, LocalStore, Nudge};
pub use config::Config;
pub use dialer::{tel_uri, DigitBuffer, Keypad};
pub use error::{CacheError, ClipboardError, FetchError, StorageError};
pub use http::{Fetcher, HttpFetcher, Request, Response};
pub use policy::{FetchOutcome, RequestClass, ResponseSource, RevalidationPolicy};
pub use typing::{ClipboardSource, KeypadSurface, TriggerOutcome, TypingSequencer};
pub use worker::{ReloadGuard, ServiceWorker, WorkerState};
