//! Application configuration management.
//!
//! The configuration names the deployment the worker serves (its scope URL),
//! the cache version, the asset manifest and the typing delays.
//!
//! Configuration is stored at `~/.config/phone-keypad/config.json`.
//! `KEYPAD_SCOPE` and `KEYPAD_CACHE_VERSION` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::assets::{AssetManifest, DEFAULT_ASSETS, DEFAULT_FALLBACK_ICON, DEFAULT_SHELL};
use crate::cache::{DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_VERSION};
use crate::http::DEFAULT_TIMEOUT_SECS;
use crate::typing::{TypingConfig, FIRST_DELAY_MS, INTER_DELAY_MS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "phone-keypad";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Local key-value storage file name
const STORAGE_FILE: &str = "storage.json";

const DEFAULT_SCOPE: &str = "http://localhost:8080/";

pub const SCOPE_ENV: &str = "KEYPAD_SCOPE";
pub const CACHE_VERSION_ENV: &str = "KEYPAD_CACHE_VERSION";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker scope, e.g. `https://example.com/keypad/`.
    pub scope: String,
    pub cache_prefix: String,
    pub cache_version: String,
    pub assets: Vec<String>,
    pub shell: String,
    pub fallback_icon: String,
    pub first_delay_ms: u64,
    pub inter_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            assets: DEFAULT_ASSETS.iter().map(|a| a.to_string()).collect(),
            shell: DEFAULT_SHELL.to_string(),
            fallback_icon: DEFAULT_FALLBACK_ICON.to_string(),
            first_delay_ms: FIRST_DELAY_MS,
            inter_delay_ms: INTER_DELAY_MS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(scope) = var(SCOPE_ENV).filter(|s| !s.is_empty()) {
            self.scope = scope;
        }
        if let Some(version) = var(CACHE_VERSION_ENV).filter(|s| !s.is_empty()) {
            self.cache_version = version;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Local key-value storage used for calibration.
    pub fn storage_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(STORAGE_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn bucket_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("buckets"))
    }

    pub fn scope_url(&self) -> Result<Url> {
        let scope = Url::parse(&self.scope)
            .with_context(|| format!("Invalid scope URL: {}", self.scope))?;
        if scope.cannot_be_a_base() {
            anyhow::bail!("Scope URL must be hierarchical: {}", self.scope);
        }
        Ok(scope)
    }

    pub fn manifest(&self) -> Result<AssetManifest> {
        Ok(AssetManifest::new(
            &self.scope_url()?,
            &self.assets,
            &self.shell,
            &self.fallback_icon,
        ))
    }

    pub fn typing(&self) -> TypingConfig {
        TypingConfig {
            first_delay: Duration::from_millis(self.first_delay_ms),
            inter_delay: Duration::from_millis(self.inter_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
