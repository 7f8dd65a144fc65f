//! Command execution
//!
//! All external tools run through a [`CommandExecutor`]. The provisioning
//! workflow never spawns processes itself, which keeps the real system
//! executor, the dry-run executor and test doubles interchangeable.
//!
//! [`SystemExecutor`] is the only place that calls `Command::spawn`:
//!
//! - Process group isolation via `.in_new_process_group()`
//! - PID registration with [`ChildRegistry::global()`] for signal cleanup
//! - Captured stdout/stderr, optional stdin

use crate::command_traits::HostCommand;
use crate::error::{ProvisionError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Output from an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited with status 0.
    pub success: bool,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            success: false,
        }
    }

    /// Convert an unsuccessful run into [`ProvisionError::Command`].
    pub fn ensure_success(self, command: &HostCommand) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ProvisionError::Command {
                command: command.command_line(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Seam between the workflow and the host.
pub trait CommandExecutor {
    /// Run the command to completion and capture its output.
    ///
    /// Returns `Err` only when the command could not be run at all; a
    /// non-zero exit is reported through [`CommandOutput::success`].
    fn execute(&self, command: &HostCommand) -> Result<CommandOutput>;

    /// True when commands are only logged, not run. Filesystem writes into
    /// the image root are skipped as well.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, command: &HostCommand) -> Result<CommandOutput> {
        info!("exec: {}", command);
        if !command.env.is_empty() {
            debug!("exec env: {:?}", command.env);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ProvisionError::validation(format!("Failed to spawn {}: {}", command.program, e))
        })?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        if let (Some(input), Some(mut stdin)) = (command.stdin.as_deref(), child.stdin.take()) {
            // A child that exits without reading everything closes the pipe
            // early; its exit status is what gets reported
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                warn!("Failed to write stdin of {}: {}", command.program, e);
            }
        }

        let output = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = output?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };

        for line in result.stdout.lines() {
            debug!("  | {}", line);
        }
        if !result.success {
            info!(
                "{} failed with exit code {}",
                command.program,
                result.exit_code.unwrap_or(-1)
            );
        }

        Ok(result)
    }
}

/// Logs commands without running them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

impl CommandExecutor for DryRunExecutor {
    fn execute(&self, command: &HostCommand) -> Result<CommandOutput> {
        info!("[DRY RUN] {}", command);
        Ok(CommandOutput::ok(String::new()))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
