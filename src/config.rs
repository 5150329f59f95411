use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sync::SyncError;

pub const SOURCE_ENV: &str = "RAPORD_SOURCE_DB";
pub const DESTINATION_ENV: &str = "RAPORD_DEST_DB";
pub const SYNC_CONFIG_KEY: &str = "sync.config";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// One SQLite store: the main database file plus extra schemas attached by alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub schemas: BTreeMap<String, PathBuf>,
}

impl StoreConfig {
    #[cfg(test)]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schemas: BTreeMap::new(),
        }
    }

    /// Schema names usable in a sync request against this store.
    pub fn schema_names(&self) -> Vec<String> {
        let mut names = vec!["main".to_string()];
        names.extend(self.schemas.keys().cloned());
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub source: StoreConfig,
    #[serde(default)]
    pub destination: StoreConfig,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: StoreConfig::default(),
            destination: StoreConfig::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SyncConfig {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SyncError> {
        serde_json::from_value(value.clone())
            .map_err(|e| SyncError::config(format!("malformed sync config: {}", e)))
    }

    pub fn load_file(path: &Path) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!(
                "cannot read config {}: {}",
                path.to_string_lossy(),
                e
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SyncError::config(format!(
                "config {} is invalid JSON: {}",
                path.to_string_lossy(),
                e
            ))
        })
    }

    /// Environment variables win over file and workspace settings.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var_os(SOURCE_ENV).map(PathBuf::from),
            std::env::var_os(DESTINATION_ENV).map(PathBuf::from),
        );
    }

    fn apply_overrides(&mut self, source: Option<PathBuf>, destination: Option<PathBuf>) {
        if let Some(p) = source.filter(|p| !p.as_os_str().is_empty()) {
            self.source.path = p;
        }
        if let Some(p) = destination.filter(|p| !p.as_os_str().is_empty()) {
            self.destination.path = p;
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.source.path.as_os_str().is_empty() {
            return Err(SyncError::config("source.path is required"));
        }
        if self.destination.path.as_os_str().is_empty() {
            return Err(SyncError::config("destination.path is required"));
        }
        if self.source.path == self.destination.path {
            return Err(SyncError::config(
                "source and destination must be different databases",
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(SyncError::config("busyTimeoutMs must be greater than 0"));
        }
        for store in [&self.source, &self.destination] {
            for (alias, path) in &store.schemas {
                if !is_valid_alias(alias) {
                    return Err(SyncError::config(format!(
                        "invalid schema alias: {:?}",
                        alias
                    )));
                }
                if path.as_os_str().is_empty() {
                    return Err(SyncError::config(format!(
                        "schema {} has no path",
                        alias
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && !alias.eq_ignore_ascii_case("main")
        && !alias.eq_ignore_ascii_case("temp")
        && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
