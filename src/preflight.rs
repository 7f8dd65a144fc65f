//! Pre-flight checks for the host environment
//!
//! Verifies before any host state is touched:
//! - Required host tools are on PATH
//! - The static emulator exists
//! - Running with root privileges (EUID 0)
//!
//! If any check fails, the binary prints a report and exits with status 1.

use std::path::Path;

use crate::config_file::ProvisionConfig;

/// Result of environment verification
#[derive(Debug)]
pub struct PreflightResult {
    pub missing_binaries: Vec<String>,
    pub missing_files: Vec<String>,
    pub is_root: bool,
}

impl PreflightResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.missing_files.is_empty() && self.is_root
    }
}

/// Host tools every run needs
const REQUIRED_BINARIES: &[&str] = &[
    "kpartx",
    "mount",
    "umount",
    "chroot",
    "iptables",
    "iptables-save",
    "update-binfmts",
    "sh",
];

fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all checks for `config` and return the result
pub fn verify_environment(config: &ProvisionConfig) -> PreflightResult {
    let mut missing_binaries: Vec<String> = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| binary.to_string())
        .collect();

    if !binary_exists(&config.generator) {
        missing_binaries.push(config.generator.clone());
    }

    let mut missing_files = Vec::new();
    if !config.emulator.is_file() {
        missing_files.push(config.emulator.display().to_string());
    }
    if !Path::new(&config.binfmt_dir).is_dir() {
        tracing::debug!(
            "binfmt_misc not mounted at {}; update-binfmts will mount it",
            config.binfmt_dir.display()
        );
    }

    PreflightResult {
        missing_binaries,
        missing_files,
        is_root: is_running_as_root(),
    }
}

/// Debian package that provides a host tool
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "kpartx" => "kpartx",
        "mount" | "umount" => "mount",
        "chroot" => "coreutils",
        "iptables" | "iptables-save" => "iptables",
        "update-binfmts" => "binfmt-support",
        "sh" => "dash",
        "qemu-arm-static" => "qemu-user-static",
        _ => "unknown",
    }
}

/// Render the failure report printed before exiting
pub fn format_report(result: &PreflightResult) -> String {
    let mut out = String::new();
    out.push_str("\nPre-flight check failed\n\n");

    if !result.is_root {
        out.push_str("✗ Root privileges required\n");
        out.push_str("  Mapping, mounting and chrooting into an image needs root.\n");
        out.push_str("  Run with sudo.\n\n");
    }

    if !result.missing_binaries.is_empty() {
        out.push_str("✗ Missing required tools\n");
        for binary in &result.missing_binaries {
            out.push_str(&format!(
                "  • {} (install: apt-get install {})\n",
                binary,
                get_package_for_binary(binary)
            ));
        }
        out.push('\n');
    }

    if !result.missing_files.is_empty() {
        out.push_str("✗ Missing files\n");
        for file in &result.missing_files {
            let name = Path::new(file)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            out.push_str(&format!(
                "  • {} (install: apt-get install {})\n",
                file,
                get_package_for_binary(&name)
            ));
        }
        out.push('\n');
    }

    out
}

/// Print the report to stderr and exit
pub fn print_error_and_exit(result: &PreflightResult) -> ! {
    eprint!("{}", format_report(result));
    std::process::exit(1);
}

/// Skip the root check (for development)
/// Set PINC_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("PINC_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Run all checks, exiting the process if any fails
pub fn run_preflight_checks(config: &ProvisionConfig) {
    tracing::debug!("Running pre-flight checks...");

    let mut result = verify_environment(config);

    if should_skip_root_check() {
        tracing::warn!("Root check skipped (PINC_SKIP_ROOT_CHECK=1)");
        result.is_root = true;
    }

    if !result.is_ok() {
        print_error_and_exit(&result);
    }

    tracing::info!("Pre-flight checks passed");
}
