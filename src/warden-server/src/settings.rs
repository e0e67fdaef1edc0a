//! Runtime settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use warden_policy::DEFAULT_ADMIN_NAME;

/// Settings for the gate and its control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardenSettings {
    /// Log every allowed connection.
    #[serde(default)]
    pub accept_logging: bool,

    /// Log every blocked connection.
    #[serde(default)]
    pub blocked_logging: bool,

    /// Block-list document.
    #[serde(default = "default_block_file")]
    pub block_file: PathBuf,

    /// Histogram snapshot file. `None` or an empty path disables the histogram.
    #[serde(default = "default_histogram_file")]
    pub histogram_file: Option<PathBuf>,

    /// Allow requests that carry only an address.
    #[serde(default)]
    pub allow_ip_only: bool,

    /// Reserved name resolving to loopback. Empty disables it.
    #[serde(default = "default_admin_name")]
    pub admin_name: String,

    /// Override document loaded at startup.
    #[serde(default)]
    pub dns_file: Option<PathBuf>,

    /// Registration API.
    #[serde(default)]
    pub api: ApiSettings,

    /// Seconds between periodic histogram flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

/// Listener of the registration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Port 0 disables the API.
    #[serde(default)]
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: 0,
        }
    }
}

fn default_block_file() -> PathBuf {
    PathBuf::from("fqdn-block.yml")
}

fn default_histogram_file() -> Option<PathBuf> {
    Some(PathBuf::from("hist-logger.yml"))
}

fn default_admin_name() -> String {
    DEFAULT_ADMIN_NAME.to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_flush_interval() -> u64 {
    5
}

impl Default for WardenSettings {
    fn default() -> Self {
        Self {
            accept_logging: false,
            blocked_logging: false,
            block_file: default_block_file(),
            histogram_file: default_histogram_file(),
            allow_ip_only: false,
            admin_name: default_admin_name(),
            dns_file: None,
            api: ApiSettings::default(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

impl WardenSettings {
    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        let settings = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse settings {}", path.display()))?;
        Ok(settings)
    }

    /// Address the registration API listens on, if enabled.
    pub fn api_addr(&self) -> Option<String> {
        (self.api.port != 0).then(|| format!("{}:{}", self.api.host, self.api.port))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}
