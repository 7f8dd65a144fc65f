use clap::Parser;
use std::path::PathBuf;

use crate::config_file::ProvisionConfig;

/// Provision a Raspberry Pi image as a WiFi access point
#[derive(Parser, Debug)]
#[command(name = "pinc-provision")]
#[command(
    about = "Provision a Raspberry Pi disk image as a WiFi access point",
    long_about = "Maps and mounts the image's system partition, installs hostapd and \
                  isc-dhcp-server under ARM emulation, and writes the access point \
                  configuration produced by the generator. Must run as root."
)]
#[command(version)]
pub struct Cli {
    /// Disk image to provision in place (absolute or relative path)
    pub image: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where to mount the image's system partition
    #[arg(long)]
    pub mount_point: Option<PathBuf>,

    /// Configuration generator binary
    #[arg(long)]
    pub generator: Option<String>,

    /// Log every command without running it or writing into the image
    #[arg(long)]
    pub dry_run: bool,

    /// Skip host tool and privilege checks
    #[arg(long)]
    pub skip_preflight: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut ProvisionConfig) {
        if let Some(mount_point) = &self.mount_point {
            config.mount_point = mount_point.clone();
        }
        if let Some(generator) = &self.generator {
            config.generator = generator.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_no_args_parses() {
        // Missing image is reported by main as a usage error, not by clap
        let cli = Cli::try_parse_from(["pinc-provision"]).expect("should parse");
        assert!(cli.image.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_positional_image() {
        let cli = Cli::try_parse_from(["pinc-provision", "raspbian.img"]).expect("should parse");
        assert_eq!(cli.image, Some(PathBuf::from("raspbian.img")));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "pinc-provision",
            "--mount-point",
            "/mnt/pi2",
            "--generator",
            "/opt/pinc/bin/jenny",
            "--dry-run",
            "img.img",
        ])
        .expect("should parse");
        assert!(cli.dry_run);

        let mut config = ProvisionConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.mount_point, PathBuf::from("/mnt/pi2"));
        assert_eq!(config.generator, "/opt/pinc/bin/jenny");
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["pinc-provision", "--force", "img.img"]).is_err());
    }

    #[test]
    fn test_cli_rejects_second_positional() {
        assert!(Cli::try_parse_from(["pinc-provision", "a.img", "b.img"]).is_err());
    }
}
