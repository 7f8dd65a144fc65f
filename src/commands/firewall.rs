//! Host firewall commands.
//!
//! The generator's `iptables` output is a shell script that programs the
//! *host's* tables; `iptables-save` then captures the result for the image.
//! Afterwards the host is put back to empty, fully permissive tables.

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::command_traits::CommandArgs;

/// iptables tables touched by the access-point rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum FirewallTable {
    Filter,
    Nat,
    Mangle,
}

/// Built-in chains of the filter table whose policy is reset.
pub const FILTER_CHAINS: &[&str] = &["INPUT", "FORWARD", "OUTPUT"];

/// A single iptables operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IptablesOp {
    /// `-F`: flush all rules.
    Flush,
    /// `-X`: delete user-defined chains.
    DeleteChains,
    /// `-P <chain> ACCEPT`
    AcceptPolicy(&'static str),
}

/// Arguments for `iptables [-t <table>] <op>`.
#[derive(Debug, Clone)]
pub struct IptablesArgs {
    pub table: FirewallTable,
    pub op: IptablesOp,
}

impl CommandArgs for IptablesArgs {
    fn program(&self) -> &str {
        "iptables"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.table != FirewallTable::Filter {
            args.push("-t".to_string());
            args.push(self.table.to_string());
        }
        match &self.op {
            IptablesOp::Flush => args.push("-F".to_string()),
            IptablesOp::DeleteChains => args.push("-X".to_string()),
            IptablesOp::AcceptPolicy(chain) => {
                args.push("-P".to_string());
                args.push(chain.to_string());
                args.push("ACCEPT".to_string());
            }
        }
        args
    }
}

/// The full host reset: flush and delete chains in every table, then open
/// the default policies.
pub fn reset_sequence() -> Vec<IptablesArgs> {
    let mut ops = Vec::new();
    for table in FirewallTable::iter() {
        ops.push(IptablesArgs {
            table,
            op: IptablesOp::Flush,
        });
        ops.push(IptablesArgs {
            table,
            op: IptablesOp::DeleteChains,
        });
    }
    for chain in FILTER_CHAINS {
        ops.push(IptablesArgs {
            table: FirewallTable::Filter,
            op: IptablesOp::AcceptPolicy(chain),
        });
    }
    ops
}

/// `iptables-save`, stdout is the active rule set.
#[derive(Debug, Clone, Default)]
pub struct IptablesSaveArgs;

impl CommandArgs for IptablesSaveArgs {
    fn program(&self) -> &str {
        "iptables-save"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Run a generated script with `sh`, fed through stdin.
#[derive(Debug, Clone)]
pub struct ShellScriptArgs {
    pub script: String,
}

impl CommandArgs for ShellScriptArgs {
    fn program(&self) -> &str {
        "sh"
    }

    fn to_cli_args(&self) -> Vec<String> {
        // -e so a failing rule aborts the script
        vec!["-e".to_string()]
    }

    fn stdin(&self) -> Option<String> {
        Some(self.script.clone())
    }
}
