//! JSON-on-disk bucket storage.
//!
//! Each bucket is one file, `<dir>/<bucket>.json`, holding every entry.
//! Writes replace the whole file, which makes `put_all` atomic for free.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::CacheStorage;
use crate::error::StorageError;
use crate::http::Response;

const BUCKET_EXTENSION: &str = "json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BucketFile {
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: BTreeMap<String, Response>,
}

/// Summary of one on-disk bucket, for status displays.
#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
    pub entries: usize,
    pub created_at: Option<DateTime<Utc>>,
}

impl BucketInfo {
    pub fn age_minutes(&self) -> Option<i64> {
        self.created_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "unknown".to_string();
        };
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

pub struct DiskStorage {
    dir: PathBuf,
    // Serializes read-modify-write cycles on bucket files.
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let valid = !bucket.is_empty()
            && !bucket.starts_with('.')
            && bucket
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::Unavailable(format!(
                "invalid bucket name: {:?}",
                bucket
            )));
        }
        Ok(self.dir.join(format!("{}.{}", bucket, BUCKET_EXTENSION)))
    }

    fn load(&self, bucket: &str) -> Result<Option<BucketFile>, StorageError> {
        let path = self.bucket_path(bucket)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, bucket: &str, file: &BucketFile) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(file)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn update(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut BucketFile),
    ) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("disk storage lock poisoned".to_string()))?;
        let existing = match self.load(bucket) {
            Ok(existing) => existing,
            Err(StorageError::Serialization(e)) => {
                warn!(bucket = %bucket, error = %e, "Discarding unreadable bucket");
                None
            }
            Err(e) => return Err(e),
        };
        let mut file = existing.unwrap_or_else(|| BucketFile {
            created_at: Some(Utc::now()),
            entries: BTreeMap::new(),
        });
        f(&mut file);
        self.save(bucket, &file)
    }

    /// Describe every bucket on disk. Unreadable buckets are skipped.
    pub fn describe(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let mut infos = Vec::new();
        for name in self.bucket_names()? {
            match self.load(&name) {
                Ok(Some(file)) => infos.push(BucketInfo {
                    name,
                    entries: file.entries.len(),
                    created_at: file.created_at,
                }),
                Ok(None) => {}
                Err(e) => debug!(bucket = %name, error = %e, "Failed to read bucket"),
            }
        }
        Ok(infos)
    }

    fn bucket_names(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        self.update(bucket, |_| {})
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.bucket_names()
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        let path = self.bucket_path(bucket)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("disk storage lock poisoned".to_string()))?;
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<Response>, StorageError> {
        Ok(self
            .load(bucket)?
            .and_then(|mut file| file.entries.remove(key)))
    }

    async fn put(&self, bucket: &str, key: &str, response: Response) -> Result<(), StorageError> {
        self.update(bucket, |file| {
            file.entries.insert(key.to_string(), response);
        })
    }

    async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError> {
        self.update(bucket, |file| file.entries.extend(entries))
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .load(bucket)?
            .map(|file| file.entries.into_keys().collect())
            .unwrap_or_default())
    }
}
