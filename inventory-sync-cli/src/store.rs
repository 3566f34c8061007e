//! File-backed store
//!
//! Settings live in the TOML config file. The committed cache and the
//! standalone hide flag live together in `state.json` under the state
//! directory. State writes go through a temporary file and a rename, so a
//! reader never sees a half-written cache.

use crate::config::{load_config, save_config};
use inventory_sync_core::{Cache, CacheRecord, Settings, Store, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// State file name inside the state directory
pub const STATE_FILE: &str = "state.json";

/// Persisted state shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(default)]
    cache: CacheRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hide_sold: Option<bool>,
}

pub struct FileStore {
    config_path: PathBuf,
    state_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(config_path: impl Into<PathBuf>, state_dir: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.into(),
            state_path: state_dir.as_ref().join(STATE_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn read_state(&self) -> inventory_sync_core::Result<StateFile> {
        let content = match fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| {
            SyncError::Store(format!("Failed to parse state file {:?}: {}", self.state_path, e))
        })
    }

    /// Read-modify-write of the state file
    fn update_state<F>(&self, update: F) -> inventory_sync_core::Result<()>
    where
        F: FnOnce(&mut StateFile),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SyncError::Store("state lock poisoned".to_string()))?;

        let mut state = self.read_state()?;
        update(&mut state);

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| SyncError::Store(format!("Failed to serialize state: {}", e)))?;
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }
}

impl Store for FileStore {
    /// A missing config file means all defaults
    fn load_settings(&self) -> inventory_sync_core::Result<Settings> {
        if !self.config_path.exists() {
            log::debug!("No config file at {:?}, using defaults", self.config_path);
            return Ok(Settings::default());
        }
        load_config(&self.config_path).map_err(|e| SyncError::Store(format!("{:#}", e)))
    }

    fn save_settings(&self, settings: &Settings) -> inventory_sync_core::Result<()> {
        save_config(&self.config_path, settings).map_err(|e| SyncError::Store(format!("{:#}", e)))
    }

    fn load_cache(&self) -> inventory_sync_core::Result<Cache> {
        Ok(Cache::from_record(self.read_state()?.cache))
    }

    fn save_cache(&self, cache: &Cache) -> inventory_sync_core::Result<()> {
        let record = cache.to_record();
        self.update_state(|state| state.cache = record)
    }

    fn load_hide_flag(&self) -> inventory_sync_core::Result<Option<bool>> {
        Ok(self.read_state()?.hide_sold)
    }

    fn save_hide_flag(&self, hide: bool) -> inventory_sync_core::Result<()> {
        self.update_state(|state| state.hide_sold = Some(hide))
    }
}
