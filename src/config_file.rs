//! Provisioning configuration, saved and loaded as JSON.
//!
//! Every field has a default that reproduces the stock Raspberry Pi access
//! point setup, so a config file is only needed to deviate from it. Fields
//! missing from a file fall back to their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::generator::DEFAULT_GENERATOR;

/// Provisioning configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Where the system partition is mounted on the host
    pub mount_point: PathBuf,
    /// Configuration generator binary
    pub generator: String,
    /// Static user-mode emulator copied into the image
    pub emulator: PathBuf,
    /// binfmt_misc entry name for the emulator
    pub binfmt_name: String,
    /// Host binfmt_misc directory
    pub binfmt_dir: PathBuf,
    /// Packages installed inside the image
    pub packages: Vec<String>,
    /// Services enabled inside the image
    pub services: Vec<String>,
    /// Partition number of the root filesystem; highest-numbered if unset
    pub system_partition: Option<u32>,
    /// Where the traffic-control script is written inside the image
    pub tc_path: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/mnt/rpi"),
            generator: DEFAULT_GENERATOR.to_string(),
            emulator: PathBuf::from("/usr/bin/qemu-arm-static"),
            binfmt_name: "qemu-arm".to_string(),
            binfmt_dir: PathBuf::from("/proc/sys/fs/binfmt_misc"),
            packages: vec![
                "hostapd".to_string(),
                "isc-dhcp-server".to_string(),
                "iptables".to_string(),
            ],
            services: vec!["hostapd".to_string(), "isc-dhcp-server".to_string()],
            system_partition: None,
            tc_path: PathBuf::from("/opt/pinc/bin/tc"),
        }
    }
}

impl ProvisionConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.mount_point.is_absolute() {
            anyhow::bail!(
                "Mount point must be an absolute path, got {:?}",
                self.mount_point
            );
        }
        if self.mount_point == Path::new("/") {
            anyhow::bail!("Mount point cannot be the host root");
        }

        if self.generator.trim().is_empty() {
            anyhow::bail!("Generator binary must be specified");
        }

        if self.binfmt_name.trim().is_empty() || self.binfmt_name.contains('/') {
            anyhow::bail!("Invalid binfmt entry name: {:?}", self.binfmt_name);
        }

        if let Some(bad) = self
            .packages
            .iter()
            .chain(self.services.iter())
            .find(|name| name.trim().is_empty() || name.chars().any(char::is_whitespace))
        {
            anyhow::bail!("Invalid package or service name: {:?}", bad);
        }

        if self.system_partition == Some(0) {
            anyhow::bail!("Partition numbers start at 1");
        }

        if !self.tc_path.is_absolute() {
            anyhow::bail!(
                "Traffic-control script path must be absolute, got {:?}",
                self.tc_path
            );
        }

        Ok(())
    }
}
