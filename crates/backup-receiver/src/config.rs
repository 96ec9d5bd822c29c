use core::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The receiver's limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// The maximum payload size in bytes.
    pub maximum_payload_bytes: u64,

    /// The maximum number of backups accepted per calendar day (server local time).
    pub maximum_backups_per_day: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            maximum_payload_bytes: 1024 * 1024 * 100, // 100 MiB
            maximum_backups_per_day: 50,
        }
    }
}

/// How long backups and daily counters are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retention {
    /// Files last modified more than this many days ago are removed.
    pub maximum_age_days: u64,

    /// How often the background sweep runs.
    pub sweep_interval_seconds: u64,
}

impl Retention {
    /// The retention horizon.
    pub fn maximum_age(&self) -> Duration {
        Duration::from_secs(self.maximum_age_days.saturating_mul(24 * 60 * 60))
    }

    /// The interval between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            maximum_age_days: 30,
            sweep_interval_seconds: 60 * 60,
        }
    }
}

/// The receiver's config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The address to listen for clients on.
    pub socket_address: SocketAddr,

    /// The directory backups, daily counters and the activity log are kept in.
    pub backup_directory: PathBuf,

    /// Client addresses allowed to submit backups. Empty allows everyone.
    pub allowed_addresses: Vec<IpAddr>,

    /// The receiver's limits
    pub limits: Limits,

    /// The receiver's retention policy.
    pub retention: Retention,
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: PathBuf) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile);
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config = toml::from_str(&contents)?;

        Ok(config)
    }

    /// Returns if a client address may submit backups.
    pub fn is_allowed(&self, address: IpAddr) -> bool {
        self.allowed_addresses.is_empty() || self.allowed_addresses.contains(&address)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backup_directory: PathBuf::from("backups"),
            allowed_addresses: Vec::new(),
            limits: Limits::default(),
            retention: Retention::default(),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file does not exist.")]
    NoFile,

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),
}
