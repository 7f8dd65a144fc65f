//! Type-safe host command contracts.
//!
//! Every external tool the provisioner drives (kpartx, mount, chroot,
//! iptables, the config generator) is described by a struct implementing
//! [`CommandArgs`]. The struct definition is the contract: flag spelling lives
//! in exactly one place and the executor only ever sees a [`HostCommand`].

use std::fmt;

/// A fully-resolved external command, ready to hand to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim (no shell interpretation).
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Text written to the child's stdin, if any.
    pub stdin: Option<String>,
}

impl HostCommand {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments, space separated.
    ///
    /// Used for logging and error messages only; never fed to a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())?;
        if self.stdin.is_some() {
            write!(f, " < (stdin)")?;
        }
        Ok(())
    }
}

/// Trait for typed command arguments.
///
/// # Contract
///
/// - `program()`: the executable to run (e.g. `"kpartx"`).
/// - `to_cli_args()`: arguments exactly as the tool expects them.
/// - `get_env_vars()`: environment the tool requires.
/// - `stdin()`: text piped into the tool, if any.
pub trait CommandArgs {
    /// The executable to run.
    fn program(&self) -> &str;

    /// Convert struct fields to CLI arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// Environment variables the command requires.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Text to write to the command's standard input.
    fn stdin(&self) -> Option<String> {
        None
    }

    /// Build the [`HostCommand`] this contract describes.
    fn to_command(&self) -> HostCommand {
        HostCommand {
            program: self.program().to_string(),
            args: self.to_cli_args(),
            env: self.get_env_vars(),
            stdin: self.stdin(),
        }
    }
}
