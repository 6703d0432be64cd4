use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_BASE_URL, DEFAULT_CATALOG};
use crate::error::OdataError;
use crate::store::Store;

pub const DEFAULT_CONFIG_FILE: &str = "cbs4.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub download_root: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub catalog: String,
    pub download_root: Utf8PathBuf,
    pub timeout: Duration,
}

impl ResolvedConfig {
    pub fn store(&self) -> Store {
        Store::new_with_root(self.download_root.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OdataError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| OdataError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| OdataError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OdataError> {
        let base_url = config
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let catalog = config
            .catalog
            .filter(|catalog| !catalog.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATALOG.to_string());
        let download_root = match config.download_root {
            Some(root) => Utf8PathBuf::from(root),
            None => Store::new()?.root().to_path_buf(),
        };
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(60).max(1));

        Ok(ResolvedConfig {
            base_url,
            catalog,
            download_root,
            timeout,
        })
    }
}
