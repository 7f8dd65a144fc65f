//! Provisioning workflow
//!
//! Drives one image from mapped partitions to a configured access point and
//! back to an unmounted, unmapped file. The sequence is strictly linear; the
//! [`ResourceStack`] is what makes it safe to abort at any step.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

use crate::command_runner::{CommandExecutor, CommandOutput};
use crate::command_traits::{CommandArgs, HostCommand};
use crate::commands::binfmt::{is_registration_enabled, BinfmtAction, UpdateBinfmtsArgs};
use crate::commands::chroot::ChrootArgs;
use crate::commands::firewall::{IptablesSaveArgs, ShellScriptArgs};
use crate::commands::generator::{GeneratorArgs, GeneratorKeyword};
use crate::commands::mapping::{
    parse_kpartx_output, select_system_partition, KpartxArgs, MappedPartition,
};
use crate::commands::mount::{is_mount_point, MountArgs, BIND_MOUNTS};
use crate::config_file::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::image::ImagePath;
use crate::process_guard;
use crate::provision_state::{ProvisionContext, ProvisionStage};
use crate::resources::{Resource, ResourceStack};
use crate::rootfs::{ensure_line, replace_assignment, set_assignment, TargetRoot};

/// Preload list that makes emulated binaries die with SIGILL.
pub const LD_PRELOAD_FILE: &str = "/etc/ld.so.preload";
pub const LD_PRELOAD_BACKUP: &str = "/etc/ld.so.preload.bak";

pub const HOSTAPD_CONF: &str = "/etc/hostapd/hostapd.conf";
pub const HOSTAPD_DEFAULTS: &str = "/etc/default/hostapd";
pub const DHCP_DEFAULTS: &str = "/etc/default/isc-dhcp-server";
pub const SYSCTL_CONF: &str = "/etc/sysctl.conf";
pub const IPTABLES_RULES: &str = "/etc/iptables.ipv4.nat";
pub const IP_FORWARD_SETTING: &str = "net.ipv4.ip_forward=1";

/// Mount table consulted before mounting anything.
pub const MOUNTS_TABLE: &str = "/proc/self/mounts";

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub image: ImagePath,
    pub system_partition: MappedPartition,
    /// Host paths of every file written or patched inside the image
    pub written_files: Vec<PathBuf>,
    pub stage_history: Vec<(ProvisionStage, Duration)>,
}

/// Runs the provisioning workflow against one image.
pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    executor: &'a dyn CommandExecutor,
    target: TargetRoot,
    context: ProvisionContext,
    mounts_table: PathBuf,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a ProvisionConfig, executor: &'a dyn CommandExecutor) -> Self {
        Self {
            config,
            executor,
            target: TargetRoot::new(&config.mount_point, executor.is_dry_run()),
            context: ProvisionContext::new(),
            mounts_table: PathBuf::from(MOUNTS_TABLE),
        }
    }

    /// Read active mounts from `path` instead of [`MOUNTS_TABLE`].
    pub fn with_mounts_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_table = path.into();
        self
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.context
    }

    /// Provision `image` in place.
    ///
    /// On failure every acquired resource is released before the error is
    /// returned; a teardown failure after an earlier error is logged and the
    /// earlier error wins.
    pub fn provision(&mut self, image: &ImagePath) -> Result<ProvisionReport> {
        info!("Provisioning {}", image);
        let executor = self.executor;
        let mut resources = ResourceStack::new(executor);

        match self.run_stages(image, &mut resources) {
            Ok((system_partition, written_files)) => {
                self.context.transition_to(ProvisionStage::TearingDown)?;
                if let Err(e) = resources.release_all() {
                    let _ = self.context.fail();
                    return Err(e);
                }
                self.context.transition_to(ProvisionStage::Completed)?;
                info!("{} provisioned", image);
                Ok(ProvisionReport {
                    image: image.clone(),
                    system_partition,
                    written_files,
                    stage_history: self.context.stage_history().to_vec(),
                })
            }
            Err(e) => {
                let stage = self.context.current_stage();
                let _ = self.context.fail();
                error!("Provisioning failed during '{}': {}", stage, e);
                if !resources.is_empty() {
                    info!("Releasing {} resource(s) after failure", resources.len());
                    for resource in resources.held() {
                        debug!("  held: {}", resource);
                    }
                }
                if let Err(teardown) = resources.release_all() {
                    error!("Teardown after failure incomplete: {}", teardown);
                }
                Err(e)
            }
        }
    }

    fn run_stages(
        &mut self,
        image: &ImagePath,
        resources: &mut ResourceStack<'_>,
    ) -> Result<(MappedPartition, Vec<PathBuf>)> {
        self.context.transition_to(ProvisionStage::ValidatingInput)?;
        self.config
            .validate()
            .map_err(|e| ProvisionError::config(format!("{:#}", e)))?;
        self.check_mount_point_free()?;

        self.context.transition_to(ProvisionStage::MappingImage)?;
        let partition = self.map_image(image, resources)?;

        self.context.transition_to(ProvisionStage::MountingFilesystems)?;
        self.mount_filesystems(&partition, resources)?;

        self.context.transition_to(ProvisionStage::EnablingEmulation)?;
        self.enable_emulation(resources)?;

        self.context.transition_to(ProvisionStage::InstallingPackages)?;
        self.install_packages(resources)?;

        self.context.transition_to(ProvisionStage::GeneratingConfig)?;
        let mut written = self.generate_config()?;

        self.context.transition_to(ProvisionStage::ApplyingFirewall)?;
        written.push(self.apply_firewall(resources)?);

        Ok((partition, written))
    }

    fn check_interrupted() -> Result<()> {
        match process_guard::interrupted() {
            Some(sig) => Err(ProvisionError::Interrupted(sig)),
            None => Ok(()),
        }
    }

    /// Run a command, returning its output whatever the exit status.
    ///
    /// Nothing is started once an interrupt has arrived.
    fn execute(&self, args: &dyn CommandArgs) -> Result<(HostCommand, CommandOutput)> {
        Self::check_interrupted()?;
        let command = args.to_command();
        let output = self.executor.execute(&command)?;
        Ok((command, output))
    }

    /// Run a command that must succeed.
    fn run(&self, args: &dyn CommandArgs) -> Result<CommandOutput> {
        let (command, output) = self.execute(args)?;
        Self::check_interrupted()?;
        output.ensure_success(&command)
    }

    /// Run a command that acquires `resource` and record it on the stack.
    ///
    /// The resource is recorded when the command succeeded, or when an
    /// interrupt killed it and its state is unknown, before either failure is
    /// reported.
    fn acquire(
        &self,
        args: &dyn CommandArgs,
        resource: Resource,
        resources: &mut ResourceStack<'_>,
    ) -> Result<CommandOutput> {
        let (command, output) = self.execute(args)?;
        let interrupted = Self::check_interrupted();
        if output.success || interrupted.is_err() {
            resources.push(resource);
        }
        interrupted?;
        output.ensure_success(&command)
    }

    fn generate(&self, keyword: GeneratorKeyword) -> Result<String> {
        let output = self.run(&GeneratorArgs::new(&self.config.generator, keyword))?;
        if output.stdout.trim().is_empty() && !self.executor.is_dry_run() {
            warn!("Generator produced no output for '{}'", keyword);
        }
        Ok(output.stdout)
    }

    fn check_mount_point_free(&self) -> Result<()> {
        let mount_point = &self.config.mount_point;
        match fs::read_to_string(&self.mounts_table) {
            Ok(table) if is_mount_point(&table, mount_point) => {
                Err(ProvisionError::validation(format!(
                    "{} is already a mount point; is another provisioning run active?",
                    mount_point.display()
                )))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    "Cannot read {}: {}; skipping mount point check",
                    self.mounts_table.display(),
                    e
                );
                Ok(())
            }
        }
    }

    fn map_image(
        &self,
        image: &ImagePath,
        resources: &mut ResourceStack<'_>,
    ) -> Result<MappedPartition> {
        let (command, output) = self.execute(&KpartxArgs::add(image.as_path()))?;
        // kpartx can map some partitions before failing; always unmap
        resources.push(Resource::DeviceMapping {
            image: image.as_path().to_path_buf(),
        });
        Self::check_interrupted()?;
        let output = output.ensure_success(&command)?;

        let partitions = parse_kpartx_output(&output.stdout);
        for partition in &partitions {
            debug!("Mapped {}", partition);
        }

        if partitions.is_empty() && self.executor.is_dry_run() {
            let assumed = MappedPartition {
                name: "loop0p2".to_string(),
                partition_number: self.config.system_partition.unwrap_or(2),
            };
            info!("[DRY RUN] assuming system {}", assumed);
            return Ok(assumed);
        }

        let system = select_system_partition(&partitions, self.config.system_partition)?;
        info!("System {}", system);
        Ok(system.clone())
    }

    fn mount_filesystems(
        &self,
        partition: &MappedPartition,
        resources: &mut ResourceStack<'_>,
    ) -> Result<()> {
        let root = self.target.root().to_path_buf();

        if !root.exists() {
            if !self.executor.is_dry_run() {
                fs::create_dir_all(&root)?;
            }
            resources.push(Resource::MountPointDir { path: root.clone() });
        }

        self.acquire(
            &MountArgs::device(&partition.device_path(), &root),
            Resource::Mount {
                target: root.clone(),
            },
            resources,
        )?;

        for source in BIND_MOUNTS {
            let target = self.target.path(source);
            self.acquire(
                &MountArgs::bind(Path::new(source), &target),
                Resource::Mount { target },
                resources,
            )?;
        }

        Ok(())
    }

    fn enable_emulation(&self, resources: &mut ResourceStack<'_>) -> Result<()> {
        let emulator = &self.config.emulator;
        let file_name = emulator.file_name().ok_or_else(|| {
            ProvisionError::config(format!("emulator path {:?} has no file name", emulator))
        })?;
        let dest = self.target.path("/usr/bin").join(file_name);

        if dest.exists() {
            debug!("{} already present in image", dest.display());
        } else {
            if self.executor.is_dry_run() {
                info!("[DRY RUN] copy {} -> {}", emulator.display(), dest.display());
            } else {
                fs::copy(emulator, &dest)?;
            }
            resources.push(Resource::CopiedFile { path: dest });
        }

        let name = &self.config.binfmt_name;
        if is_registration_enabled(&self.config.binfmt_dir, name) {
            info!("binfmt registration {} already enabled", name);
            return Ok(());
        }

        self.acquire(
            &UpdateBinfmtsArgs {
                action: BinfmtAction::Enable,
                name: name.clone(),
            },
            Resource::BinfmtRegistration { name: name.clone() },
            resources,
        )?;
        Ok(())
    }

    fn install_packages(&self, resources: &mut ResourceStack<'_>) -> Result<()> {
        let preload = self.target.path(LD_PRELOAD_FILE);
        let backup = self.target.path(LD_PRELOAD_BACKUP);

        let moved_aside = if preload.exists() {
            info!("Disabling {} while running emulated binaries", LD_PRELOAD_FILE);
            if !self.executor.is_dry_run() {
                fs::rename(&preload, &backup)?;
            }
            Some(resources.push(Resource::RenamedFile {
                original: preload,
                backup,
            }))
        } else {
            None
        };

        let result = self.run_package_commands();

        let restored = match moved_aside {
            Some(id) => resources.release(id),
            None => Ok(()),
        };
        result?;
        restored
    }

    fn run_package_commands(&self) -> Result<()> {
        let root = self.target.root();
        self.run(&ChrootArgs::apt_update(root))?;
        self.run(&ChrootArgs::apt_install(root, &self.config.packages))?;
        for service in &self.config.services {
            self.run(&ChrootArgs::enable_service(root, service))?;
        }
        Ok(())
    }

    fn generate_config(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        for keyword in GeneratorKeyword::iter() {
            if let Some(path) = keyword.target_path() {
                let text = self.generate(keyword)?;
                written.push(self.target.write_file(path, &text, None)?);
            }
        }

        written.push(self.target.edit_file(HOSTAPD_DEFAULTS, |content| {
            set_assignment(content, "DAEMON_CONF", HOSTAPD_CONF)
        })?);

        let devices = self.generate(GeneratorKeyword::DhcpdDevices)?;
        let devices = devices.trim();
        info!("DHCP interfaces: {:?}", devices);
        written.push(self.target.edit_file(DHCP_DEFAULTS, |content| {
            let updated = set_assignment(content, "INTERFACES", devices)?;
            let (updated, _) = replace_assignment(&updated, "INTERFACESv4", devices)?;
            Ok(updated)
        })?);

        written.push(
            self.target
                .edit_file(SYSCTL_CONF, |content| Ok(ensure_line(content, IP_FORWARD_SETTING)))?,
        );

        let tc = self.generate(GeneratorKeyword::Tc)?;
        written.push(self.target.write_file(
            &self.config.tc_path.to_string_lossy(),
            &tc,
            Some(0o755),
        )?);

        Ok(written)
    }

    fn apply_firewall(&self, resources: &mut ResourceStack<'_>) -> Result<PathBuf> {
        let script = self.generate(GeneratorKeyword::Iptables)?;

        // Registered before the script runs so a half-applied rule set is
        // still reset
        resources.push(Resource::HostFirewall);
        self.run(&ShellScriptArgs { script })?;

        let saved = self.run(&IptablesSaveArgs)?;
        self.target.write_file(IPTABLES_RULES, &saved.stdout, None)
    }
}
