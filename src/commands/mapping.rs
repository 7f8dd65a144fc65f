//! Device-mapper partition mapping via `kpartx`.
//!
//! `kpartx -av <image>` prints one line per partition it maps:
//!
//! ```text
//! add map loop0p1 (253:0): 0 524288 linear 7:0 8192
//! add map loop0p2 (253:1): 0 3653632 linear 7:0 532480
//! ```
//!
//! Every line is parsed; anything that does not look like `add map <name>`
//! is ignored, and an output with no parsable line is an error rather than a
//! guess.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::command_traits::CommandArgs;
use crate::error::{ProvisionError, Result};

/// Directory device-mapper exposes mapped partitions under.
pub const MAPPER_DIR: &str = "/dev/mapper";

/// What `kpartx` should do with the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpartxAction {
    /// `-av`: add mappings, verbose (prints the mapped names).
    Add,
    /// `-dv`: delete mappings.
    Delete,
}

impl KpartxAction {
    pub fn as_flag(&self) -> &'static str {
        match self {
            KpartxAction::Add => "-av",
            KpartxAction::Delete => "-dv",
        }
    }
}

/// Type-safe arguments for `kpartx`.
#[derive(Debug, Clone)]
pub struct KpartxArgs {
    pub image: PathBuf,
    pub action: KpartxAction,
}

impl KpartxArgs {
    pub fn add(image: &Path) -> Self {
        Self {
            image: image.to_path_buf(),
            action: KpartxAction::Add,
        }
    }

    pub fn delete(image: &Path) -> Self {
        Self {
            image: image.to_path_buf(),
            action: KpartxAction::Delete,
        }
    }
}

impl CommandArgs for KpartxArgs {
    fn program(&self) -> &str {
        "kpartx"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.action.as_flag().to_string(),
            self.image.display().to_string(),
        ]
    }
}

/// One partition mapped by `kpartx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPartition {
    /// Mapper name, e.g. `loop0p2`.
    pub name: String,
    /// 1-based partition number taken from the name suffix.
    pub partition_number: u32,
}

impl MappedPartition {
    /// `/dev/mapper/<name>`
    pub fn device_path(&self) -> PathBuf {
        Path::new(MAPPER_DIR).join(&self.name)
    }
}

impl fmt::Display for MappedPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {} ({})",
            self.partition_number,
            self.device_path().display()
        )
    }
}

/// Parse a single `add map <name> ...` line.
pub fn parse_mapping_line(line: &str) -> Option<MappedPartition> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "add" || fields.next()? != "map" {
        return None;
    }
    let name = fields.next()?;
    let (_, number) = name.rsplit_once('p')?;
    let partition_number = number.parse::<u32>().ok().filter(|n| *n > 0)?;

    Some(MappedPartition {
        name: name.to_string(),
        partition_number,
    })
}

/// Parse every mapping line in `kpartx -av` output, in output order.
pub fn parse_kpartx_output(output: &str) -> Vec<MappedPartition> {
    output.lines().filter_map(parse_mapping_line).collect()
}

/// Pick the system (root) partition.
///
/// With `pinned` set, that partition number must be present. Otherwise the
/// highest-numbered partition wins; Raspberry Pi images put the boot FAT
/// partition first and the root filesystem last.
pub fn select_system_partition(
    partitions: &[MappedPartition],
    pinned: Option<u32>,
) -> Result<&MappedPartition> {
    if partitions.is_empty() {
        return Err(ProvisionError::mapping(
            "kpartx reported no mapped partitions",
        ));
    }

    match pinned {
        Some(number) => partitions
            .iter()
            .find(|p| p.partition_number == number)
            .ok_or_else(|| {
                let found: Vec<String> = partitions.iter().map(|p| p.name.clone()).collect();
                ProvisionError::mapping(format!(
                    "partition {} not found among mapped partitions [{}]",
                    number,
                    found.join(", ")
                ))
            }),
        None => partitions
            .iter()
            .max_by_key(|p| p.partition_number)
            .ok_or_else(|| ProvisionError::mapping("kpartx reported no mapped partitions")),
    }
}
