pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_ENV: &str = "ACRFLOW_CONFIG";
const CANDIDATES: [&str; 4] = ["acrflow.yaml", ".acrflow.yaml", "acrflow.yml", ".acrflow.yml"];
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// acrflow の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub registry: Option<String>,
    /// Resource Manager endpoint override.
    pub management_url: Option<String>,
    /// Delay between log polls that return nothing new.
    pub poll_interval_ms: u64,
    /// `.dockerignore` style file, relative to the context directory.
    pub ignore_file: Option<PathBuf>,
    /// Extra ignore patterns, evaluated after the ignore file.
    pub ignore: Vec<String>,
    pub images: Vec<String>,
    pub dockerfile: Option<String>,
    /// `os/arch[/variant]`
    pub platform: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_id: None,
            resource_group: None,
            registry: None,
            management_url: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            ignore_file: None,
            ignore: Vec::new(),
            images: Vec::new(),
            dockerfile: None,
            platform: None,
        }
    }
}

impl Settings {
    /// Discover and load the settings file, then apply environment overrides.
    ///
    /// A missing settings file is not an error.
    pub fn load() -> Result<Self> {
        let settings = match find_config_file()? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        Ok(settings.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        tracing::debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `ACRFLOW_SUBSCRIPTION_ID`, `ACRFLOW_RESOURCE_GROUP`, `ACRFLOW_REGISTRY`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_value("ACRFLOW_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = env_value("ACRFLOW_RESOURCE_GROUP") {
            self.resource_group = Some(v);
        }
        if let Some(v) = env_value("ACRFLOW_REGISTRY") {
            self.registry = Some(v);
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn require_subscription(&self) -> Result<&str> {
        require(&self.subscription_id, "subscription_id")
    }

    pub fn require_resource_group(&self) -> Result<&str> {
        require(&self.resource_group, "resource_group")
    }

    pub fn require_registry(&self) -> Result<&str> {
        require(&self.registry, "registry")
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// acrflow のグローバル設定ディレクトリ
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("acrflow"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 ACRFLOW_CONFIG (直接パス指定、存在しなければエラー)
/// 2. カレントディレクトリ: acrflow.yaml, .acrflow.yaml, acrflow.yml, .acrflow.yml
/// 3. ~/.config/acrflow/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Some(config_path) = env_value(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::FileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = get_config_dir() {
        let global_config = config_dir.join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
