//! Versioned response cache for offline access.
//!
//! This module provides the `CacheStoreManager`, which owns the single
//! current bucket (`phone-keypad-<version>`), precaches the asset manifest
//! on install and purges older buckets on activation.
//!
//! Storage backends:
//! - `MemoryStorage`: process-local, used by tests and embedded hosts
//! - `DiskStorage`: one JSON file per bucket

pub mod disk;
pub mod manager;
pub mod storage;

pub use disk::{BucketInfo, DiskStorage};
pub use manager::{
    bucket_name, ActivateReport, CacheStoreManager, InstallReport, DEFAULT_CACHE_PREFIX,
    DEFAULT_CACHE_VERSION,
};
pub use storage::{CacheStorage, MemoryStorage};
