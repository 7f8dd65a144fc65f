//! Type-safe arguments for `mount` and `umount`.

use std::path::{Path, PathBuf};

use crate::command_traits::CommandArgs;

/// Host pseudo-filesystems bind-mounted into the image before chrooting,
/// in mount order.
pub const BIND_MOUNTS: &[&str] = &["/dev", "/proc", "/sys"];

/// Arguments for `mount [--bind] <source> <target>`.
#[derive(Debug, Clone)]
pub struct MountArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub bind: bool,
}

impl MountArgs {
    /// Mount a block device.
    pub fn device(source: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            bind: false,
        }
    }

    /// Bind-mount a host directory.
    pub fn bind(source: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            bind: true,
        }
    }
}

impl CommandArgs for MountArgs {
    fn program(&self) -> &str {
        "mount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if self.bind {
            args.push("--bind".to_string());
        }
        args.push(self.source.display().to_string());
        args.push(self.target.display().to_string());
        args
    }
}

/// Arguments for `umount <target>`.
#[derive(Debug, Clone)]
pub struct UmountArgs {
    pub target: PathBuf,
}

impl CommandArgs for UmountArgs {
    fn program(&self) -> &str {
        "umount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.target.display().to_string()]
    }
}

/// Whether `path` appears as a mount target in a `/proc/self/mounts` table.
pub fn is_mount_point(mounts_table: &str, path: &Path) -> bool {
    let wanted = path.to_string_lossy();
    let wanted = wanted.trim_end_matches('/');
    mounts_table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| target == wanted)
}
