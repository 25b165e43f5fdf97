use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{cvlog_debug, Error, Result};

const DEFAULT_DRAIN_RETRY_MS: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Delay before a drain pass retries a job whose worker is busy.
    #[serde(default = "default_drain_retry_ms")]
    pub drain_retry_ms: u64,
    /// Graph is split across several rendered subgraphs.
    #[serde(default)]
    pub cfa_split: bool,
    /// Skip the ARG hand-off after the CFA worker finishes.
    #[serde(default)]
    pub arg_tab_disabled: bool,
}

fn default_drain_retry_ms() -> u64 {
    DEFAULT_DRAIN_RETRY_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drain_retry_ms: DEFAULT_DRAIN_RETRY_MS,
            cfa_split: false,
            arg_tab_disabled: false,
        }
    }
}

impl Config {
    pub fn cfaview_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".cfaview"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::cfaview_dir()?.join("cfaview.toml"))
    }

    pub fn drain_retry(&self) -> Duration {
        Duration::from_millis(self.drain_retry_ms)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        cvlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            cvlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        cvlog_debug!(
            "Config loaded: drain_retry_ms={}, cfa_split={}, arg_tab_disabled={}",
            config.drain_retry_ms,
            config.cfa_split,
            config.arg_tab_disabled
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                cvlog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        cvlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
