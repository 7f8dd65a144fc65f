//! binfmt_misc registration for user-mode emulation.

use std::fs;
use std::path::Path;

use crate::command_traits::CommandArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinfmtAction {
    Enable,
    Disable,
}

/// Arguments for `update-binfmts --enable|--disable <name>`.
#[derive(Debug, Clone)]
pub struct UpdateBinfmtsArgs {
    pub action: BinfmtAction,
    pub name: String,
}

impl CommandArgs for UpdateBinfmtsArgs {
    fn program(&self) -> &str {
        "update-binfmts"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let flag = match self.action {
            BinfmtAction::Enable => "--enable",
            BinfmtAction::Disable => "--disable",
        };
        vec![flag.to_string(), self.name.clone()]
    }
}

/// Whether `<binfmt_dir>/<name>` exists and its first line reads `enabled`.
pub fn is_registration_enabled(binfmt_dir: &Path, name: &str) -> bool {
    fs::read_to_string(binfmt_dir.join(name))
        .map(|content| content.lines().next().map(str::trim) == Some("enabled"))
        .unwrap_or(false)
}
