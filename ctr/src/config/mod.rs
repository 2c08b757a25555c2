use crate::format::{ColorChoice, OutputFormat};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the image store
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Namespace commands act on
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Snapshotter used by check and import
    #[serde(default = "default_snapshotter")]
    pub snapshotter: String,
    /// Command timeout in seconds, 0 for none
    #[serde(default)]
    pub timeout: u64,
    /// Style configuration
    #[serde(default)]
    pub style: StyleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            namespace: default_namespace(),
            snapshotter: default_snapshotter(),
            timeout: 0,
            style: StyleConfig::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(libctr::client::DEFAULT_ROOT)
}

fn default_namespace() -> String {
    libctr::images::DEFAULT_NAMESPACE.to_string()
}

fn default_snapshotter() -> String {
    libctr::DEFAULT_SNAPSHOTTER.to_string()
}

/// Style configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Output format: pretty, json, yaml
    #[serde(default)]
    pub format: OutputFormat,
    /// Color output control: auto, always, never
    #[serde(default)]
    pub color: ColorChoice,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Get the config file path, respecting the CTR_CONFIG environment variable
pub fn get_config_path() -> PathBuf {
    if let Ok(config_path) = env::var("CTR_CONFIG") {
        return PathBuf::from(config_path);
    }

    // ~/.config/ctr/config.toml on Linux
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("ctr").join("config.toml")
    } else {
        PathBuf::from("config.toml")
    }
}
