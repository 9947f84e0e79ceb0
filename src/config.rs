//! Configuration for cfsync.
//!
//! Everything here is startup configuration: the reconciler never takes
//! dynamic inputs. A missing config file means defaults, which are enough
//! for the common case (HTTPS allow rules in the public zone).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::source::DEFAULT_ENDPOINT;

const DEFAULT_CACHE_PATH: &str = "/var/lib/cfsync/state.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider endpoint publishing the IP ranges
    pub endpoint: String,

    /// Path of the JSON state cache
    pub cache_path: PathBuf,

    /// firewalld zone the allow rules live in
    pub zone: String,

    /// Stage rules in the permanent configuration (applied on reload)
    pub permanent: bool,

    /// TCP ports the fetched ranges are allowed to reach
    pub allowed_ports: BTreeSet<u16>,

    /// HTTP timeout for the range fetch, in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            zone: "public".to_string(),
            permanent: true,
            allowed_ports: [443u16].into_iter().collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file. A missing file yields the
    /// defaults; an unreadable or invalid file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {:?}: {}", path, e)))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("failed to parse {:?}: {}", path, e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.allowed_ports.is_empty() {
            return Err(SyncError::Config(
                "allowed_ports must name at least one port".to_string(),
            ));
        }

        if self.allowed_ports.contains(&0) {
            return Err(SyncError::Config("port 0 is not a valid port".to_string()));
        }

        if !self.endpoint.starts_with("https://") {
            return Err(SyncError::Config(format!(
                "endpoint must use HTTPS: {}",
                self.endpoint
            )));
        }

        if self.zone.is_empty() {
            return Err(SyncError::Config("zone must not be empty".to_string()));
        }

        if self.timeout_secs == 0 {
            return Err(SyncError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
