use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::segmentation::{
    config::{DEFAULT_INACTIVITY_TIMEOUT_SECS, DEFAULT_RETENTION_PERIOD_SECS},
    EngineConfig,
};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub inactivity_timeout_secs: u64,
    pub retention_period_secs: u64,
    pub sweep_interval_secs: u64,
    pub autosave_interval_secs: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            retention_period_secs: DEFAULT_RETENTION_PERIOD_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

impl CaptureSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            inactivity_timeout_secs: self.inactivity_timeout_secs,
            retention_period_secs: self.retention_period_secs,
        }
    }

    /// Replace zero or otherwise unusable values with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.engine_config().validate().is_err() {
            warn!("Ignoring invalid engine settings {:?}; using defaults", self.engine_config());
            self.inactivity_timeout_secs = defaults.inactivity_timeout_secs;
            self.retention_period_secs = defaults.retention_period_secs;
        }
        if self.sweep_interval_secs == 0 {
            self.sweep_interval_secs = defaults.sweep_interval_secs;
        }
        if self.autosave_interval_secs == 0 {
            self.autosave_interval_secs = defaults.autosave_interval_secs;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    capture: CaptureSettings,
}

/// `settings.json` in the data directory, cached in memory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Settings at {} are unreadable ({err}); using defaults", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };
        data.capture = data.capture.sanitized();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn capture(&self) -> CaptureSettings {
        self.read().capture
    }

    /// Validate, store and persist new capture settings.
    pub fn update_capture(&self, settings: CaptureSettings) -> Result<()> {
        settings
            .engine_config()
            .validate()
            .context("rejected capture settings")?;
        let settings = settings.sanitized();

        let mut guard = self.write();
        guard.capture = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("settings.json")).unwrap();
        assert_eq!(store.capture(), CaptureSettings::default());
        assert_eq!(store.capture().engine_config(), EngineConfig::default());
    }

    #[test]
    fn update_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let updated = CaptureSettings {
            inactivity_timeout_secs: 45,
            ..CaptureSettings::default()
        };
        store.update_capture(updated).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.capture(), updated);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("settings.json")).unwrap();
        let bad = CaptureSettings {
            inactivity_timeout_secs: 0,
            ..CaptureSettings::default()
        };
        assert!(store.update_capture(bad).is_err());
        assert_eq!(store.capture(), CaptureSettings::default());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"capture": {"inactivityTimeoutSecs": 0, "sweepIntervalSecs": 5}}"#)
            .unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.capture().inactivity_timeout_secs, DEFAULT_INACTIVITY_TIMEOUT_SECS);
        assert_eq!(store.capture().sweep_interval_secs, 5);

        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.capture(), CaptureSettings::default());
    }
}
