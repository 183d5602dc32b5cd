//! Core value types shared by every stage.

use crate::planner::PartitionPlan;
use atomic_error::{InstallError, InstallResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Firmware boot mode of the target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootMode {
    Legacy,
    Uefi,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::Legacy => write!(f, "LEGACY"),
            BootMode::Uefi => write!(f, "UEFI"),
        }
    }
}

impl FromStr for BootMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "bios" => Ok(BootMode::Legacy),
            "uefi" | "efi" => Ok(BootMode::Uefi),
            other => Err(format!("unknown boot mode '{}' (expected legacy or uefi)", other)),
        }
    }
}

/// Filesystem created on the root partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootFilesystemKind {
    Ext4,
    Btrfs,
}

impl RootFilesystemKind {
    pub fn is_btrfs(self) -> bool {
        self == RootFilesystemKind::Btrfs
    }
}

impl fmt::Display for RootFilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootFilesystemKind::Ext4 => write!(f, "ext4"),
            RootFilesystemKind::Btrfs => write!(f, "btrfs"),
        }
    }
}

impl FromStr for RootFilesystemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ext4" => Ok(RootFilesystemKind::Ext4),
            "btrfs" => Ok(RootFilesystemKind::Btrfs),
            other => Err(format!("unknown filesystem '{}' (expected ext4 or btrfs)", other)),
        }
    }
}

/// Logical role of a partition. Declaration order is physical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionRole {
    Bios,
    Efi,
    Boot,
    Root,
    Temp,
}

impl PartitionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionRole::Bios => "bios",
            PartitionRole::Efi => "efi",
            PartitionRole::Boot => "boot",
            PartitionRole::Root => "root",
            PartitionRole::Temp => "temp",
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container image to deploy. Passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub role: PartitionRole,
    /// 1-based physical partition number.
    pub number: u32,
    pub device: PathBuf,
    /// Filesystem UUID captured right after formatting (`None` for the unformatted BIOS stub).
    pub uuid: Option<String>,
}

impl Partition {
    pub fn uuid(&self) -> InstallResult<&str> {
        match self.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => Ok(uuid),
            _ => Err(InstallError::EmptyUuid(self.device.clone())),
        }
    }
}

/// Role -> device table produced once by the disk mutator and read by every later stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    pub disk: PathBuf,
    pub bios: Option<Partition>,
    pub efi: Partition,
    pub boot: Partition,
    pub root: Partition,
    pub temp: Partition,
}

impl PartitionMap {
    /// Pair the plan's roles with partition devices listed in physical order.
    ///
    /// Role at plan index `i` becomes partition number `i + 1`; names are never consulted.
    pub fn from_devices(
        disk: &Path,
        plan: &PartitionPlan,
        devices: &[PathBuf],
    ) -> InstallResult<Self> {
        if devices.len() != plan.len() {
            return Err(InstallError::PartitionCountMismatch {
                disk: disk.to_path_buf(),
                expected: plan.len(),
                found: devices.len(),
            });
        }

        let mut slots: [Option<Partition>; 5] = Default::default();
        for (idx, (spec, device)) in plan.specs().iter().zip(devices).enumerate() {
            slots[spec.role as usize] = Some(Partition {
                role: spec.role,
                number: idx as u32 + 1,
                device: device.clone(),
                uuid: None,
            });
        }
        let [bios, efi, boot, root, temp] = slots;
        let require = |slot: Option<Partition>, role: PartitionRole| {
            slot.ok_or(InstallError::MissingRole(role.as_str()))
        };

        let map = Self {
            disk: disk.to_path_buf(),
            bios,
            efi: require(efi, PartitionRole::Efi)?,
            boot: require(boot, PartitionRole::Boot)?,
            root: require(root, PartitionRole::Root)?,
            temp: require(temp, PartitionRole::Temp)?,
        };
        if plan.boot_mode() == BootMode::Legacy && map.bios.is_none() {
            return Err(InstallError::MissingRole(PartitionRole::Bios.as_str()));
        }
        Ok(map)
    }

    pub fn get(&self, role: PartitionRole) -> Option<&Partition> {
        match role {
            PartitionRole::Bios => self.bios.as_ref(),
            PartitionRole::Efi => Some(&self.efi),
            PartitionRole::Boot => Some(&self.boot),
            PartitionRole::Root => Some(&self.root),
            PartitionRole::Temp => Some(&self.temp),
        }
    }

    pub(crate) fn get_mut(&mut self, role: PartitionRole) -> Option<&mut Partition> {
        match role {
            PartitionRole::Bios => self.bios.as_mut(),
            PartitionRole::Efi => Some(&mut self.efi),
            PartitionRole::Boot => Some(&mut self.boot),
            PartitionRole::Root => Some(&mut self.root),
            PartitionRole::Temp => Some(&mut self.temp),
        }
    }

    /// Partitions in physical order.
    pub fn partitions(&self) -> Vec<&Partition> {
        let mut parts: Vec<&Partition> = self.bios.iter().collect();
        parts.extend([&self.efi, &self.boot, &self.root, &self.temp]);
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;

    fn devices(disk: &str, count: u32) -> Vec<PathBuf> {
        (1..=count)
            .map(|n| PathBuf::from(format!("{}{}", disk, n)))
            .collect()
    }

    #[test]
    fn legacy_map_numbers_roles_in_plan_order() {
        let plan = plan(BootMode::Legacy, RootFilesystemKind::Ext4);
        let map =
            PartitionMap::from_devices(Path::new("/dev/sda"), &plan, &devices("/dev/sda", 5))
                .unwrap();
        let bios = map.bios.as_ref().unwrap();
        assert_eq!(bios.number, 1);
        assert_eq!(map.efi.device, PathBuf::from("/dev/sda2"));
        assert_eq!(map.root.number, 4);
        assert_eq!(map.temp.device, PathBuf::from("/dev/sda5"));
        let numbers: Vec<u32> = map.partitions().iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn uefi_map_has_no_bios_partition() {
        let plan = plan(BootMode::Uefi, RootFilesystemKind::Btrfs);
        let map = PartitionMap::from_devices(
            Path::new("/dev/nvme0n1"),
            &plan,
            &[
                PathBuf::from("/dev/nvme0n1p1"),
                PathBuf::from("/dev/nvme0n1p2"),
                PathBuf::from("/dev/nvme0n1p3"),
                PathBuf::from("/dev/nvme0n1p4"),
            ],
        )
        .unwrap();
        assert!(map.get(PartitionRole::Bios).is_none());
        assert_eq!(map.root.device, PathBuf::from("/dev/nvme0n1p3"));
        assert_eq!(map.partitions().len(), 4);
    }

    #[test]
    fn device_count_mismatch_is_an_error() {
        let plan = plan(BootMode::Uefi, RootFilesystemKind::Ext4);
        let err = PartitionMap::from_devices(Path::new("/dev/sda"), &plan, &devices("/dev/sda", 3))
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::PartitionCountMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn missing_uuid_is_reported_with_device() {
        let part = Partition {
            role: PartitionRole::Boot,
            number: 2,
            device: PathBuf::from("/dev/sda2"),
            uuid: Some(String::new()),
        };
        assert!(matches!(part.uuid(), Err(InstallError::EmptyUuid(_))));
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("UEFI".parse::<BootMode>().unwrap(), BootMode::Uefi);
        assert_eq!(
            "Btrfs".parse::<RootFilesystemKind>().unwrap(),
            RootFilesystemKind::Btrfs
        );
        assert!("zfs".parse::<RootFilesystemKind>().is_err());
    }
}
