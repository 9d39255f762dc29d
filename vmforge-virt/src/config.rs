//! Configuration for probing and remote channel establishment.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::HostAddress;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtConfig {
    /// Host liveness probing configuration
    pub probe: ProbeConfig,
    /// Remote channel configuration
    pub remote: RemoteConfig,
}

impl VirtConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: VirtConfig = serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Hypervisor endpoint URI for a host.
    ///
    /// The local sentinel gets a direct local channel; remote hosts get
    /// the secure tunneled scheme from the configuration.
    pub fn uri_for(&self, host: &HostAddress) -> String {
        if host.is_local() {
            return format!("qemu:///{}", self.remote.driver_path);
        }

        match &self.remote.ssh_user {
            Some(user) => format!(
                "{}://{}@{}/{}",
                self.remote.scheme,
                user,
                host.as_str(),
                self.remote.driver_path
            ),
            None => format!(
                "{}://{}/{}",
                self.remote.scheme,
                host.as_str(),
                self.remote.driver_path
            ),
        }
    }
}

/// Host liveness probing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe attempts before a host is declared unreachable
    pub attempts: u32,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Prober binary
    pub binary: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_ms: 1000,
            binary: "fping".to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Remote channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// URI scheme for remote hosts
    pub scheme: String,
    /// SSH user for the tunneled channel (connects as the current user
    /// if not set)
    pub ssh_user: Option<String>,
    /// Driver path component of the endpoint URI
    pub driver_path: String,
    /// Channel establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: "qemu+ssh".to_string(),
            ssh_user: None,
            driver_path: "system".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
