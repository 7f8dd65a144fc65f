//! Provision State Machine
//!
//! Authoritative record of where a provisioning run is. Transitions only move
//! forward one stage at a time; any running stage may fail.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! ValidatingInput
//!     ↓
//! MappingImage
//!     ↓
//! MountingFilesystems
//!     ↓
//! EnablingEmulation
//!     ↓
//! InstallingPackages
//!     ↓
//! GeneratingConfig
//!     ↓
//! ApplyingFirewall
//!     ↓
//! TearingDown
//!     ↓
//! Completed
//!
//! (Any running stage can transition to Failed)
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Provisioning stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProvisionStage {
    NotStarted = 0,
    /// Resolving the image path and checking configuration
    ValidatingInput = 1,
    /// Mapping partitions with kpartx
    MappingImage = 2,
    /// Mounting the root partition and bind-mounting /dev, /proc, /sys
    MountingFilesystems = 3,
    /// Copying the emulator and enabling binfmt_misc
    EnablingEmulation = 4,
    /// apt-get and service enablement inside the chroot
    InstallingPackages = 5,
    /// Writing generator output into the image
    GeneratingConfig = 6,
    /// Applying rules on the host and saving them into the image
    ApplyingFirewall = 7,
    /// Unmounting and unmapping
    TearingDown = 8,
    /// Terminal: image provisioned
    Completed = 9,
    /// Terminal: run aborted
    Failed = 255,
}

impl ProvisionStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the next stage in the sequence, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::ValidatingInput),
            Self::ValidatingInput => Some(Self::MappingImage),
            Self::MappingImage => Some(Self::MountingFilesystems),
            Self::MountingFilesystems => Some(Self::EnablingEmulation),
            Self::EnablingEmulation => Some(Self::InstallingPackages),
            Self::InstallingPackages => Some(Self::GeneratingConfig),
            Self::GeneratingConfig => Some(Self::ApplyingFirewall),
            Self::ApplyingFirewall => Some(Self::TearingDown),
            Self::TearingDown => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::ValidatingInput => "Validating input",
            Self::MappingImage => "Mapping image partitions",
            Self::MountingFilesystems => "Mounting filesystems",
            Self::EnablingEmulation => "Enabling ARM emulation",
            Self::InstallingPackages => "Installing packages",
            Self::GeneratingConfig => "Generating configuration",
            Self::ApplyingFirewall => "Applying firewall rules",
            Self::TearingDown => "Tearing down",
            Self::Completed => "Provisioning complete",
            Self::Failed => "Provisioning failed",
        }
    }

    /// Approximate progress percentage for log output
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::ValidatingInput => 2,
            Self::MappingImage => 5,
            Self::MountingFilesystems => 10,
            Self::EnablingEmulation => 15,
            Self::InstallingPackages => 20,
            Self::GeneratingConfig => 75,
            Self::ApplyingFirewall => 85,
            Self::TearingDown => 95,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::ValidatingInput,
            Self::MappingImage,
            Self::MountingFilesystems,
            Self::EnablingEmulation,
            Self::InstallingPackages,
            Self::GeneratingConfig,
            Self::ApplyingFirewall,
            Self::TearingDown,
            Self::Completed,
        ]
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: ProvisionStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: ProvisionStage },
}

impl From<ProvisionTransitionError> for crate::error::ProvisionError {
    fn from(err: ProvisionTransitionError) -> Self {
        crate::error::ProvisionError::state(err.to_string())
    }
}

/// Tracks the stage of one provisioning run.
///
/// ```
/// use pinc_provision::provision_state::{ProvisionContext, ProvisionStage};
///
/// let mut ctx = ProvisionContext::new();
/// ctx.transition_to(ProvisionStage::ValidatingInput).unwrap();
/// assert!(ctx.transition_to(ProvisionStage::InstallingPackages).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    current: ProvisionStage,
    failed_at: Option<ProvisionStage>,
    /// Stages entered, with time since the run started
    stage_history: Vec<(ProvisionStage, Duration)>,
    started: Instant,
}

impl Default for ProvisionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionContext {
    pub fn new() -> Self {
        Self {
            current: ProvisionStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(ProvisionStage::all_stages().len()),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> ProvisionStage {
        self.current
    }

    /// Stage that was running when the run failed
    #[inline]
    pub fn failed_at(&self) -> Option<ProvisionStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == ProvisionStage::Completed
    }

    pub fn stage_history(&self) -> &[(ProvisionStage, Duration)] {
        &self.stage_history
    }

    /// Transition to `target`, which must be the immediate next stage.
    pub fn transition_to(
        &mut self,
        target: ProvisionStage,
    ) -> Result<ProvisionStage, ProvisionTransitionError> {
        if self.current.is_terminal() {
            return Err(ProvisionTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(ProvisionTransitionError::AlreadyAtStage { stage: target });
        }
        if target == ProvisionStage::Failed {
            return Err(ProvisionTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.order() < self.current.order() {
            return Err(ProvisionTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(ProvisionTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.record(target);
        tracing::info!("[{:>3}%] {}", target.progress_percent(), target);
        Ok(target)
    }

    /// Mark the run as failed at the current stage.
    pub fn fail(&mut self) -> Result<(), ProvisionTransitionError> {
        if self.current.is_terminal() {
            return Err(ProvisionTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.record(ProvisionStage::Failed);
        Ok(())
    }

    fn record(&mut self, stage: ProvisionStage) {
        self.stage_history.push((stage, self.started.elapsed()));
        self.current = stage;
    }
}
