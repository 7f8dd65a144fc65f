//! Commands run inside the image via `chroot`.
//!
//! Target binaries are ARM; they execute through the copied
//! `qemu-arm-static` interpreter and the host's binfmt_misc registration.

use std::path::{Path, PathBuf};

use crate::command_traits::CommandArgs;

/// Environment every package command runs with.
const APT_ENV: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

/// Arguments for `chroot <root> <program> <args...>`.
#[derive(Debug, Clone)]
pub struct ChrootArgs {
    pub root: PathBuf,
    pub program: String,
    pub args: Vec<String>,
}

impl ChrootArgs {
    pub fn new(root: &Path, program: &str, args: &[&str]) -> Self {
        Self {
            root: root.to_path_buf(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `apt-get update`
    pub fn apt_update(root: &Path) -> Self {
        Self::new(root, "apt-get", &["update"])
    }

    /// `apt-get install -y <packages...>`
    pub fn apt_install(root: &Path, packages: &[String]) -> Self {
        let mut args = Self::new(root, "apt-get", &["install", "-y"]);
        args.args.extend(packages.iter().cloned());
        args
    }

    /// `update-rc.d <service> enable`
    pub fn enable_service(root: &Path, service: &str) -> Self {
        Self::new(root, "update-rc.d", &[service, "enable"])
    }
}

impl CommandArgs for ChrootArgs {
    fn program(&self) -> &str {
        "chroot"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![self.root.display().to_string(), self.program.clone()];
        args.extend(self.args.iter().cloned());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![(APT_ENV.0.to_string(), APT_ENV.1.to_string())]
    }
}
