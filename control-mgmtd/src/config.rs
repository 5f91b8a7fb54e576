use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::types::IsdAs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub control: ControlConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub ca: Option<CaConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// ISD-AS this control service instance serves.
    pub isd_as: IsdAs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_beacon_db_path")]
    pub beacon_db_path: PathBuf,
    #[serde(default = "default_trust_db_path")]
    pub trust_db_path: PathBuf,
    /// How often expired beacons are removed from the store.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Present only on deployments with CA capability; its absence removes the
/// CA connectivity check from health reports entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct CaConfig {
    pub health_url: String,
    #[serde(default = "default_ca_timeout")]
    pub timeout_secs: u64,
}

fn default_beacon_db_path() -> PathBuf {
    PathBuf::from("/var/lib/control-mgmtd/beacons.db")
}

fn default_trust_db_path() -> PathBuf {
    PathBuf::from("/var/lib/control-mgmtd/trust.db")
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_listen() -> String {
    "[::]:30452".to_string()
}

fn default_ca_timeout() -> u64 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            beacon_db_path: default_beacon_db_path(),
            trust_db_path: default_trust_db_path(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
