//! Overlay calibration offset.
//!
//! The keypad overlay can be nudged a few pixels to line up with the
//! background screenshot. The offset is kept in a small key-value store
//! (the app's equivalent of browser local storage).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Storage key for the offset.
pub const CALIBRATION_KEY: &str = "overlay-calibration-screenshot-v3";

/// Pixels moved per nudge.
pub const NUDGE_STEP: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    Up,
    Down,
    Left,
    Right,
}

impl Calibration {
    pub fn nudge(&mut self, direction: Nudge) {
        match direction {
            Nudge::Up => self.y = self.y.saturating_sub(NUDGE_STEP),
            Nudge::Down => self.y = self.y.saturating_add(NUDGE_STEP),
            Nudge::Left => self.x = self.x.saturating_sub(NUDGE_STEP),
            Nudge::Right => self.x = self.x.saturating_add(NUDGE_STEP),
        }
    }

    /// CSS custom properties the page applies to the overlay.
    pub fn css_vars(&self) -> [(&'static str, String); 2] {
        [
            ("--overlay-offset-x", format!("{}px", self.x)),
            ("--overlay-offset-y", format!("{}px", self.y)),
        ]
    }
}

/// String key-value store persisted as one JSON object.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    /// Set a key. A corrupt store file is replaced rather than failing.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut all = self.read_all().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable local store");
            BTreeMap::new()
        });
        all.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

pub struct CalibrationStore {
    store: LocalStore,
}

impl CalibrationStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Saved offset, or `{0, 0}` when missing or unreadable.
    pub fn load(&self) -> Calibration {
        let raw = match self.store.get(CALIBRATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Calibration::default(),
            Err(e) => {
                debug!(error = %e, "Failed to read calibration, using default");
                return Calibration::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(error = %e, "Corrupt calibration, using default");
            Calibration::default()
        })
    }

    /// Persist the offset. Failures are logged and otherwise ignored.
    pub fn save(&self, calibration: &Calibration) {
        let result = serde_json::to_string(calibration)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.set(CALIBRATION_KEY, &raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to save calibration");
        }
    }
}
