use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::write_atomic;
use crate::validate::validate_trail_name;

const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_TRAIL_NAME: &str = "Untitled Trail";
pub const DEFAULT_EXPORT_TITLE: &str = "Brie Browser Trails";
pub const DEFAULT_DATA_FILE: &str = "trails.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read store config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse store config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize store config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write store config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How invalid trail names are treated.
/// 無效路徑名稱的處理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamePolicy {
    /// Replace with the default name on create, keep the old name on update.
    /// 建立時改用預設名稱；更新時保留原名稱。
    #[default]
    Fallback,
    /// Fail the operation with a validation error.
    /// 直接回傳驗證錯誤。
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default)]
    pub name_policy: NamePolicy,
    #[serde(default = "default_trail_name")]
    pub default_trail_name: String,
    #[serde(default = "default_export_title")]
    pub export_title: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_data_file() -> String {
    DEFAULT_DATA_FILE.to_string()
}

fn default_trail_name() -> String {
    DEFAULT_TRAIL_NAME.to_string()
}

fn default_export_title() -> String {
    DEFAULT_EXPORT_TITLE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            data_file: default_data_file(),
            name_policy: NamePolicy::default(),
            default_trail_name: default_trail_name(),
            export_title: default_export_title(),
        }
    }
}

impl StoreConfig {
    /// Loads the config file, falling back to defaults when it does not exist.
    /// 載入設定檔；檔案不存在時使用預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: StoreConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let payload =
            serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Serialize {
                path: path.clone(),
                source,
            })?;
        write_atomic(&path, &payload).map_err(|source| ConfigError::Write { path, source })
    }

    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        if self.data_file.trim().is_empty() {
            self.data_file = default_data_file();
        }
        if !validate_trail_name(&self.default_trail_name) {
            self.default_trail_name = default_trail_name();
        }
        if self.export_title.trim().is_empty() {
            self.export_title = default_export_title();
        }
    }

    /// Resolves the data file against a data directory.
    pub fn data_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.data_file)
    }
}
