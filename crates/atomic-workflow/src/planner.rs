//! Partition layout planning. Pure: no I/O, only offsets, flags and filesystems.

use crate::model::{BootMode, PartitionRole, RootFilesystemKind};
use std::fmt;

/// Size of the trailing scratch partition unless configured otherwise (20 GiB).
pub const DEFAULT_TEMP_MIB: u64 = 20 * 1024;

const BIOS_MIB: u64 = 2;
const EFI_MIB: u64 = 1000;
const BOOT_MIB: u64 = 2000;
/// Leading gap kept free for alignment and the GPT header.
const FIRST_START_MIB: u64 = 1;

/// A partition boundary as understood by `parted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Absolute offset from the start of the disk.
    Mib(u64),
    /// Offset counted back from the end of the disk.
    FromEnd(u64),
    /// Percentage of the disk; only `100%` is used, for the last partition.
    Percent(u8),
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Mib(n) => write!(f, "{}MiB", n),
            Boundary::FromEnd(n) => write!(f, "-{}MiB", n),
            Boundary::Percent(p) => write!(f, "{}%", p),
        }
    }
}

/// Filesystem created on a partition by the disk mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Fat32,
    Ext4,
    Btrfs,
}

impl FsKind {
    /// File system type word passed to `parted mkpart`.
    pub fn parted_name(self) -> &'static str {
        match self {
            FsKind::Fat32 => "fat32",
            FsKind::Ext4 => "ext4",
            FsKind::Btrfs => "btrfs",
        }
    }
}

impl From<RootFilesystemKind> for FsKind {
    fn from(kind: RootFilesystemKind) -> Self {
        match kind {
            RootFilesystemKind::Ext4 => FsKind::Ext4,
            RootFilesystemKind::Btrfs => FsKind::Btrfs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub role: PartitionRole,
    pub start: Boundary,
    pub end: Boundary,
    /// parted flags switched on after creation.
    pub flags: Vec<&'static str>,
    /// `None` leaves the partition unformatted (BIOS boot stub).
    pub filesystem: Option<FsKind>,
    /// GPT partition name.
    pub label: &'static str,
}

/// Ordered layout; index `i` is physical partition `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    boot_mode: BootMode,
    root_fs: RootFilesystemKind,
    specs: Vec<PartitionSpec>,
}

impl PartitionPlan {
    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    pub fn root_fs(&self) -> RootFilesystemKind {
        self.root_fs
    }

    pub fn specs(&self) -> &[PartitionSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn roles(&self) -> Vec<PartitionRole> {
        self.specs.iter().map(|s| s.role).collect()
    }

    /// Physical partition number planned for `role`.
    pub fn number_of(&self, role: PartitionRole) -> Option<u32> {
        self.specs
            .iter()
            .position(|s| s.role == role)
            .map(|idx| idx as u32 + 1)
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Partition plan ({}, root {}):",
            self.boot_mode, self.root_fs
        )];
        for (idx, spec) in self.specs.iter().enumerate() {
            let fs = spec.filesystem.map(FsKind::parted_name).unwrap_or("-");
            let flags = if spec.flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", spec.flags.join(","))
            };
            lines.push(format!(
                "{:>2}. {:<5} {:>10} .. {:<10} {:<6}{}",
                idx + 1,
                spec.label,
                spec.start.to_string(),
                spec.end.to_string(),
                fs,
                flags
            ));
        }
        lines
    }
}

pub fn plan(boot_mode: BootMode, root_fs: RootFilesystemKind) -> PartitionPlan {
    plan_with_temp_size(boot_mode, root_fs, DEFAULT_TEMP_MIB)
}

pub fn plan_with_temp_size(
    boot_mode: BootMode,
    root_fs: RootFilesystemKind,
    temp_mib: u64,
) -> PartitionPlan {
    let mut specs = Vec::with_capacity(5);
    let mut cursor = FIRST_START_MIB;

    if boot_mode == BootMode::Legacy {
        specs.push(PartitionSpec {
            role: PartitionRole::Bios,
            start: Boundary::Mib(cursor),
            end: Boundary::Mib(cursor + BIOS_MIB),
            flags: vec!["bios_grub"],
            filesystem: None,
            label: "BIOS",
        });
        cursor += BIOS_MIB;
    }

    specs.push(PartitionSpec {
        role: PartitionRole::Efi,
        start: Boundary::Mib(cursor),
        end: Boundary::Mib(cursor + EFI_MIB),
        flags: vec!["boot"],
        filesystem: Some(FsKind::Fat32),
        label: "EFI",
    });
    cursor += EFI_MIB;

    specs.push(PartitionSpec {
        role: PartitionRole::Boot,
        start: Boundary::Mib(cursor),
        end: Boundary::Mib(cursor + BOOT_MIB),
        flags: Vec::new(),
        filesystem: Some(FsKind::Ext4),
        label: "BOOT",
    });
    cursor += BOOT_MIB;

    specs.push(PartitionSpec {
        role: PartitionRole::Root,
        start: Boundary::Mib(cursor),
        end: Boundary::FromEnd(temp_mib),
        flags: Vec::new(),
        filesystem: Some(root_fs.into()),
        label: "ROOT",
    });

    specs.push(PartitionSpec {
        role: PartitionRole::Temp,
        start: Boundary::FromEnd(temp_mib),
        end: Boundary::Percent(100),
        flags: Vec::new(),
        filesystem: Some(FsKind::Ext4),
        label: "TEMP",
    });

    PartitionPlan {
        boot_mode,
        root_fs,
        specs,
    }
}
