//! Raspberry Pi access point image provisioning
//!
//! Maps a disk image with `kpartx`, mounts its system partition, installs
//! the access point packages under ARM user-mode emulation and writes the
//! configuration produced by an external generator. Every host resource
//! acquired along the way is released on both the success and failure paths.

pub mod cli;
pub mod command_runner;
pub mod command_traits;
pub mod commands;
pub mod config_file;
pub mod error;
pub mod image;
pub mod preflight;
pub mod process_guard;
pub mod provision_state;
pub mod provisioner;
pub mod resources;
pub mod rootfs;

pub use command_runner::{CommandExecutor, CommandOutput, DryRunExecutor, SystemExecutor};
pub use command_traits::{CommandArgs, HostCommand};
pub use commands::generator::GeneratorKeyword;
pub use commands::mapping::MappedPartition;
pub use config_file::ProvisionConfig;
pub use error::ProvisionError;
pub use image::ImagePath;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use provision_state::{ProvisionContext, ProvisionStage, ProvisionTransitionError};
pub use provisioner::{ProvisionReport, Provisioner};
pub use resources::{Resource, ResourceStack};
