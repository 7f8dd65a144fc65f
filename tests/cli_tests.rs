//! Binary-level tests for pinc-provision
//!
//! These tests verify:
//! - Usage errors exit with status 1 and print usage
//! - Configuration errors exit with status 1
//! - A dry run completes without touching the host

use std::fs;
use std::process::{Command, Output};

use pinc_provision::config_file::ProvisionConfig;

fn run_binary(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pinc-provision"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run pinc-provision")
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = run_binary(&[]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("Usage"), "stdout: {}", stdout);
    assert!(stderr.contains("missing image path"), "stderr: {}", stderr);
}

#[test]
fn test_nonexistent_image_is_usage_error() {
    let output = run_binary(&["/nonexistent/raspbian.img"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not an existing image file"), "stderr: {}", stderr);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

#[test]
fn test_help_exits_zero() {
    let output = run_binary(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--dry-run"));
}

#[test]
fn test_unknown_flag_exits_one() {
    let output = run_binary(&["--no-such-flag"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_malformed_config_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("raspbian.img");
    let config = dir.path().join("pinc.json");
    fs::write(&image, b"").expect("write image");
    fs::write(&config, "{ not json").expect("write config");

    let output = run_binary(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        image.to_str().expect("utf-8 path"),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}

#[test]
fn test_dry_run_succeeds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("raspbian.img");
    let mount_point = dir.path().join("rpi");
    let binfmt_dir = dir.path().join("binfmt_misc");
    fs::write(&image, b"").expect("write image");
    fs::create_dir_all(&binfmt_dir).expect("create binfmt dir");

    let config_path = dir.path().join("pinc.json");
    ProvisionConfig {
        binfmt_dir,
        ..Default::default()
    }
    .save_to_file(&config_path)
    .expect("save config");

    let output = run_binary(&[
        "--dry-run",
        "--config",
        config_path.to_str().expect("utf-8 path"),
        "--mount-point",
        mount_point.to_str().expect("utf-8 path"),
        image.to_str().expect("utf-8 path"),
    ]);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Provisioned"));
    assert!(!mount_point.exists(), "dry run must not create the mount point");
}
