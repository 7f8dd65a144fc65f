//! The external configuration generator (`jenny` by default).
//!
//! The generator is treated as a pure text producer: one keyword in, the
//! configuration for that domain on stdout.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::command_traits::CommandArgs;

/// Default generator binary name.
pub const DEFAULT_GENERATOR: &str = "jenny";

/// Configuration domains the generator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKeyword {
    /// `/etc/network/interfaces`
    Interfaces,
    /// `/etc/hostapd/hostapd.conf`
    Hostapd,
    /// `/etc/dhcp/dhcpd.conf`
    Dhcpd,
    /// Interface list for `/etc/default/isc-dhcp-server`
    DhcpdDevices,
    /// Shell commands programming the firewall
    Iptables,
    /// Traffic-control script
    Tc,
}

impl GeneratorKeyword {
    /// Path inside the image the output is written to verbatim, for the
    /// keywords whose output is a file of its own.
    pub fn target_path(&self) -> Option<&'static str> {
        match self {
            GeneratorKeyword::Interfaces => Some("/etc/network/interfaces"),
            GeneratorKeyword::Hostapd => Some("/etc/hostapd/hostapd.conf"),
            GeneratorKeyword::Dhcpd => Some("/etc/dhcp/dhcpd.conf"),
            // tc lands at the configurable ProvisionConfig::tc_path
            GeneratorKeyword::DhcpdDevices | GeneratorKeyword::Iptables | GeneratorKeyword::Tc => {
                None
            }
        }
    }
}

/// Arguments for `<generator> <keyword>`.
#[derive(Debug, Clone)]
pub struct GeneratorArgs {
    pub binary: String,
    pub keyword: GeneratorKeyword,
}

impl GeneratorArgs {
    pub fn new(binary: &str, keyword: GeneratorKeyword) -> Self {
        Self {
            binary: binary.to_string(),
            keyword,
        }
    }
}

impl CommandArgs for GeneratorArgs {
    fn program(&self) -> &str {
        &self.binary
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.keyword.to_string()]
    }
}
