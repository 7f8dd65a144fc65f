//! Scoped acquisition of host resources.
//!
//! Everything the workflow changes on the host (device mappings, mounts,
//! the binfmt registration, firewall tables) or temporarily inside the image
//! (the disabled preload file, the copied emulator) is pushed onto a
//! [`ResourceStack`] right after it is acquired. The stack releases entries in
//! reverse order, on success through [`ResourceStack::release_all`] and on any
//! early return through `Drop`.
//!
//! Released entries are removed from the stack, so releasing twice is a no-op.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::command_runner::CommandExecutor;
use crate::command_traits::CommandArgs;
use crate::commands::binfmt::{BinfmtAction, UpdateBinfmtsArgs};
use crate::commands::firewall::reset_sequence;
use crate::commands::mapping::KpartxArgs;
use crate::commands::mount::UmountArgs;
use crate::error::{ProvisionError, Result};

/// A host or image resource that must be given back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Partitions mapped with `kpartx -av`; released with `kpartx -dv`.
    DeviceMapping { image: PathBuf },
    /// Mount point directory created by the provisioner.
    MountPointDir { path: PathBuf },
    /// A mount (device or bind).
    Mount { target: PathBuf },
    /// A file copied into the image that was not there before.
    CopiedFile { path: PathBuf },
    /// binfmt_misc registration enabled by the provisioner.
    BinfmtRegistration { name: String },
    /// A file moved aside; restored by renaming it back.
    RenamedFile { original: PathBuf, backup: PathBuf },
    /// Host iptables state changed; released by the reset sequence.
    HostFirewall,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::DeviceMapping { image } => write!(f, "device mapping of {}", image.display()),
            Resource::MountPointDir { path } => write!(f, "mount point {}", path.display()),
            Resource::Mount { target } => write!(f, "mount at {}", target.display()),
            Resource::CopiedFile { path } => write!(f, "copied file {}", path.display()),
            Resource::BinfmtRegistration { name } => write!(f, "binfmt registration {}", name),
            Resource::RenamedFile { original, .. } => {
                write!(f, "moved-aside file {}", original.display())
            }
            Resource::HostFirewall => write!(f, "host firewall rules"),
        }
    }
}

/// Handle returned by [`ResourceStack::push`] for releasing one entry early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId(u64);

/// Stack of acquired resources, unwound in reverse order.
pub struct ResourceStack<'a> {
    executor: &'a dyn CommandExecutor,
    entries: Vec<(ResourceId, Resource)>,
    next_id: u64,
}

impl<'a> ResourceStack<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self {
            executor,
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Record an acquired resource.
    pub fn push(&mut self, resource: Resource) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        debug!("Acquired {}", resource);
        self.entries.push((id, resource));
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries still held, oldest first.
    pub fn held(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter().map(|(_, r)| r)
    }

    /// Release one entry ahead of the rest. Unknown or already released ids
    /// are ignored.
    pub fn release(&mut self, id: ResourceId) -> Result<()> {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                let (_, resource) = self.entries.remove(index);
                self.release_one(&resource)
            }
            None => Ok(()),
        }
    }

    /// Release every entry, newest first.
    ///
    /// Every release is attempted even after a failure; the first failure is
    /// returned.
    pub fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some((_, resource)) = self.entries.pop() {
            if let Err(e) = self.release_one(&resource) {
                error!("Failed to release {}: {}", resource, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run(&self, args: &dyn CommandArgs) -> Result<()> {
        let command = args.to_command();
        self.executor.execute(&command)?.ensure_success(&command)?;
        Ok(())
    }

    fn release_one(&self, resource: &Resource) -> Result<()> {
        info!("Releasing {}", resource);
        let dry_run = self.executor.is_dry_run();
        match resource {
            Resource::DeviceMapping { image } => self.run(&KpartxArgs::delete(image)),
            Resource::Mount { target } => self.run(&UmountArgs {
                target: target.clone(),
            }),
            Resource::BinfmtRegistration { name } => self.run(&UpdateBinfmtsArgs {
                action: BinfmtAction::Disable,
                name: name.clone(),
            }),
            Resource::HostFirewall => {
                // Attempt the whole sequence so a failed flush still opens
                // the policies
                let mut first_error = None;
                for op in reset_sequence() {
                    if let Err(e) = self.run(&op) {
                        warn!("Host firewall reset step failed: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            Resource::MountPointDir { path } if !dry_run => {
                fs::remove_dir(path).map_err(ProvisionError::from)
            }
            Resource::CopiedFile { path } if !dry_run => {
                fs::remove_file(path).map_err(ProvisionError::from)
            }
            Resource::RenamedFile { original, backup } if !dry_run => {
                fs::rename(backup, original).map_err(ProvisionError::from)
            }
            Resource::MountPointDir { .. }
            | Resource::CopiedFile { .. }
            | Resource::RenamedFile { .. } => {
                info!("[DRY RUN] release {}", resource);
                Ok(())
            }
        }
    }
}

impl Drop for ResourceStack<'_> {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        warn!(
            "Unwinding {} resource(s) still held",
            self.entries.len()
        );
        if let Err(e) = self.release_all() {
            error!("Resource unwinding incomplete: {}", e);
        }
    }
}
