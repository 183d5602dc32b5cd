//! Fake HAL implementation for testing.
//!
//! Records every operation without executing it, and keeps just enough simulated state
//! (partition tables, mount table, filesystem UUIDs, subvolumes) for workflows to make the same
//! decisions they would make against a real disk. Failures can be injected per program.

use super::{
    BtrfsOps, ContainerOps, ContainerRun, FormatOps, FormatOptions, HostInfoOps, MountOps,
    MountOptions, PartedOp, PartedOptions, PartitionOps, ProbeOps, ResizeOps, ResizeOptions,
    RsyncOps, RsyncOptions, SystemOps, WipeFsOptions,
};
use crate::path::partition_path;
use crate::{HalError, HalResult};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Mount {
        source: PathBuf,
        target: PathBuf,
        options: Option<String>,
    },
    Unmount {
        target: PathBuf,
    },
    FormatExt4 {
        device: PathBuf,
    },
    FormatBtrfs {
        device: PathBuf,
    },
    FormatVfat {
        device: PathBuf,
    },
    Sync,
    UdevSettle,
    WipeFsAll {
        disk: PathBuf,
    },
    Parted {
        disk: PathBuf,
        args: Vec<String>,
    },
    LsblkPartitions {
        disk: PathBuf,
    },
    LsblkTable {
        disk: PathBuf,
    },
    BlkidUuid {
        device: PathBuf,
    },
    BtrfsSubvolumeList {
        mount_point: PathBuf,
    },
    BtrfsSubvolumeCreate {
        path: PathBuf,
    },
    BtrfsResizeMax {
        mount_point: PathBuf,
    },
    E2fsck {
        device: PathBuf,
    },
    Resize2fs {
        device: PathBuf,
    },
    Rsync {
        src: PathBuf,
        dst: PathBuf,
        args: Vec<String>,
    },
    ContainerRun {
        engine: String,
        argv: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct FakeHalState {
    operations: Vec<Operation>,
    /// Mounted targets in mount order, with their source device.
    mounts: Vec<(PathBuf, PathBuf)>,
    block_devices: HashSet<PathBuf>,
    /// Partition numbers present on each disk.
    tables: BTreeMap<PathBuf, BTreeSet<u32>>,
    uuids: BTreeMap<PathBuf, String>,
    uuid_counter: u32,
    subvolumes: BTreeSet<PathBuf>,
    failing_programs: HashSet<String>,
    effective_root: bool,
    uefi: bool,
}

/// Fake HAL implementation that records operations without executing them.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        let hal = Self::default();
        hal.state().effective_root = true;
        hal
    }

    /// A fake with `disk` present as an empty block device.
    pub fn with_disk(disk: impl Into<PathBuf>) -> Self {
        let hal = Self::new();
        hal.add_block_device(disk);
        hal
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state().operations.iter().any(check)
    }

    /// Index of the first recorded operation matching `check`.
    pub fn position(&self, check: impl Fn(&Operation) -> bool) -> Option<usize> {
        self.state().operations.iter().position(check)
    }

    /// Clear recorded operations. Simulated disk and mount state is kept.
    pub fn clear(&self) {
        self.state().operations.clear();
    }

    pub fn add_block_device(&self, path: impl Into<PathBuf>) {
        self.state().block_devices.insert(path.into());
    }

    /// Make every subsequent invocation of `program` fail with exit status 1.
    pub fn fail_program(&self, program: &str) {
        self.state().failing_programs.insert(program.to_string());
    }

    pub fn set_effective_root(&self, root: bool) {
        self.state().effective_root = root;
    }

    pub fn set_uefi(&self, uefi: bool) {
        self.state().uefi = uefi;
    }

    /// Overwrite the filesystem UUID reported for `device`.
    pub fn set_uuid(&self, device: impl Into<PathBuf>, uuid: impl Into<String>) {
        self.state().uuids.insert(device.into(), uuid.into());
    }

    pub fn add_subvolume(&self, path: impl Into<PathBuf>) {
        self.state().subvolumes.insert(path.into());
    }

    /// Pretend `disk` already carries partitions `1..=count`.
    pub fn seed_partitions(&self, disk: &Path, count: u32) {
        let mut state = self.state();
        state.block_devices.insert(disk.to_path_buf());
        state
            .tables
            .insert(disk.to_path_buf(), (1..=count).collect());
    }

    /// Pretend `source` is mounted on `target` (e.g. a leftover from a previous run).
    pub fn seed_mount(&self, source: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.state().mounts.push((target.into(), source.into()));
    }

    pub fn partition_numbers(&self, disk: &Path) -> Vec<u32> {
        self.state()
            .tables
            .get(disk)
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn mounted_targets(&self) -> Vec<PathBuf> {
        self.state().mounts.iter().map(|(t, _)| t.clone()).collect()
    }

    fn record_operation(&self, op: Operation) {
        self.state().operations.push(op);
    }

    fn check_failure(&self, program: &str) -> HalResult<()> {
        if self.state().failing_programs.contains(program) {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn assign_uuid(&self, device: &Path) {
        let mut state = self.state();
        state.uuid_counter += 1;
        let n = state.uuid_counter;
        state.uuids.insert(
            device.to_path_buf(),
            format!("fa4e{:04x}-0000-4000-8000-{:012x}", n, n),
        );
    }

    fn find_partition_owner(state: &FakeHalState, device: &Path) -> bool {
        state
            .tables
            .iter()
            .any(|(disk, nums)| nums.iter().any(|n| partition_path(disk, *n) == device))
    }

    fn mkfs(&self, program: &str, device: &Path, confirmed: bool, op: Operation) -> HalResult<()> {
        if !confirmed {
            return Err(HalError::SafetyLock);
        }
        log::info!("FAKE HAL: {} {}", program, device.display());
        self.record_operation(op);
        self.check_failure(program)?;
        self.assign_uuid(device);
        Ok(())
    }

    fn edit_table(&self, disk: &Path, op: &PartedOp) -> HalResult<String> {
        let mut state = self.state();
        let missing = |n: u32| HalError::CommandFailed {
            program: "parted".to_string(),
            code: Some(1),
            stderr: format!("Error: Partition doesn't exist: {}", n),
        };
        match op {
            PartedOp::MkLabel { .. } => {
                state.tables.insert(disk.to_path_buf(), BTreeSet::new());
            }
            PartedOp::MkPart { .. } => {
                let table = state.tables.entry(disk.to_path_buf()).or_default();
                let next = table.iter().next_back().copied().unwrap_or(0) + 1;
                table.insert(next);
            }
            PartedOp::Rm { part_num } => {
                let removed = state
                    .tables
                    .get_mut(disk)
                    .is_some_and(|t| t.remove(part_num));
                if !removed {
                    return Err(missing(*part_num));
                }
                let device = partition_path(disk, *part_num);
                state.uuids.remove(&device);
            }
            PartedOp::SetFlag { part_num, .. }
            | PartedOp::Name { part_num, .. }
            | PartedOp::ResizePart { part_num, .. } => {
                let exists = state
                    .tables
                    .get(disk)
                    .is_some_and(|t| t.contains(part_num));
                if !exists {
                    return Err(missing(*part_num));
                }
            }
        }
        Ok(String::new())
    }
}

impl MountOps for FakeHal {
    fn mount(&self, source: &Path, target: &Path, options: &MountOptions) -> HalResult<()> {
        log::info!(
            "FAKE HAL: mount {} -> {} ({:?})",
            source.display(),
            target.display(),
            options.as_str()
        );
        self.record_operation(Operation::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            options: options.options.clone(),
        });
        self.check_failure("mount")?;
        self.state()
            .mounts
            .push((target.to_path_buf(), source.to_path_buf()));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: umount {}", target.display());
        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
        });
        self.check_failure("umount")?;

        let mut state = self.state();
        match state.mounts.iter().rposition(|(t, _)| t == target) {
            Some(idx) => {
                state.mounts.remove(idx);
                Ok(())
            }
            None => Err(HalError::CommandFailed {
                program: "umount".to_string(),
                code: Some(32),
                stderr: format!("umount: {}: not mounted.", target.display()),
            }),
        }
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.state().mounts.iter().any(|(t, _)| t == path))
    }
}

impl FormatOps for FakeHal {
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        let op = Operation::FormatExt4 {
            device: device.to_path_buf(),
        };
        self.mkfs("mkfs.ext4", device, opts.confirmed, op)
    }

    fn format_btrfs(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        let op = Operation::FormatBtrfs {
            device: device.to_path_buf(),
        };
        self.mkfs("mkfs.btrfs", device, opts.confirmed, op)
    }

    fn format_vfat(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        let op = Operation::FormatVfat {
            device: device.to_path_buf(),
        };
        self.mkfs("mkfs.vfat", device, opts.confirmed, op)
    }
}

impl SystemOps for FakeHal {
    fn sync(&self) -> HalResult<()> {
        self.record_operation(Operation::Sync);
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        self.record_operation(Operation::UdevSettle);
        Ok(())
    }
}

impl HostInfoOps for FakeHal {
    fn proc_mountinfo(&self) -> HalResult<String> {
        let state = self.state();
        let lines = state
            .mounts
            .iter()
            .enumerate()
            .map(|(idx, (target, source))| {
                format!(
                    "{} 1 0:{} / {} rw,relatime - fake {} rw\n",
                    idx + 100,
                    idx + 100,
                    target.display(),
                    source.display()
                )
            })
            .collect();
        Ok(lines)
    }

    fn is_effective_root(&self) -> bool {
        self.state().effective_root
    }

    fn uefi_firmware_present(&self) -> bool {
        self.state().uefi
    }
}

impl ProbeOps for FakeHal {
    fn is_block_device(&self, path: &Path) -> HalResult<bool> {
        let state = self.state();
        Ok(state.block_devices.contains(path) || Self::find_partition_owner(&state, path))
    }

    fn lsblk_partitions(&self, disk: &Path) -> HalResult<Vec<PathBuf>> {
        self.record_operation(Operation::LsblkPartitions {
            disk: disk.to_path_buf(),
        });
        self.check_failure("lsblk")?;
        Ok(self
            .partition_numbers(disk)
            .into_iter()
            .map(|n| partition_path(disk, n))
            .collect())
    }

    fn lsblk_table(&self, disk: &Path) -> HalResult<String> {
        self.record_operation(Operation::LsblkTable {
            disk: disk.to_path_buf(),
        });
        let mut table = String::from("NAME TYPE\n");
        for n in self.partition_numbers(disk) {
            table.push_str(&format!("{} part\n", partition_path(disk, n).display()));
        }
        Ok(table)
    }

    fn blkid_uuid(&self, device: &Path) -> HalResult<String> {
        self.record_operation(Operation::BlkidUuid {
            device: device.to_path_buf(),
        });
        self.check_failure("blkid")?;
        Ok(self.state().uuids.get(device).cloned().unwrap_or_default())
    }
}

impl PartitionOps for FakeHal {
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.record_operation(Operation::WipeFsAll {
            disk: disk.to_path_buf(),
        });
        self.check_failure("wipefs")?;

        let mut state = self.state();
        if let Some(table) = state.tables.remove(disk) {
            for n in table {
                state.uuids.remove(&partition_path(disk, n));
            }
        }
        Ok(())
    }

    fn parted(&self, disk: &Path, op: PartedOp, opts: &PartedOptions) -> HalResult<String> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.record_operation(Operation::Parted {
            disk: disk.to_path_buf(),
            args: op.args(),
        });
        self.check_failure("parted")?;
        self.edit_table(disk, &op)
    }
}

impl BtrfsOps for FakeHal {
    fn btrfs_subvolume_list(&self, mount_point: &Path) -> HalResult<String> {
        self.record_operation(Operation::BtrfsSubvolumeList {
            mount_point: mount_point.to_path_buf(),
        });
        self.check_failure("btrfs")?;
        let state = self.state();
        let listing = state
            .subvolumes
            .iter()
            .filter(|p| p.parent() == Some(mount_point))
            .enumerate()
            .filter_map(|(idx, p)| {
                let name = p.file_name()?.to_string_lossy().to_string();
                Some(format!("ID {} gen 7 top level 5 path {}\n", 256 + idx, name))
            })
            .collect();
        Ok(listing)
    }

    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()> {
        self.record_operation(Operation::BtrfsSubvolumeCreate {
            path: path.to_path_buf(),
        });
        self.check_failure("btrfs")?;
        self.state().subvolumes.insert(path.to_path_buf());
        Ok(())
    }

    fn btrfs_resize_max(&self, mount_point: &Path) -> HalResult<()> {
        self.record_operation(Operation::BtrfsResizeMax {
            mount_point: mount_point.to_path_buf(),
        });
        self.check_failure("btrfs")
    }
}

impl ResizeOps for FakeHal {
    fn e2fsck_force(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.record_operation(Operation::E2fsck {
            device: device.to_path_buf(),
        });
        self.check_failure("e2fsck")
    }

    fn resize2fs(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.record_operation(Operation::Resize2fs {
            device: device.to_path_buf(),
        });
        self.check_failure("resize2fs")
    }
}

impl RsyncOps for FakeHal {
    fn rsync_stream_stdout(
        &self,
        src: &Path,
        dst: &Path,
        opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()> {
        self.record_operation(Operation::Rsync {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            args: opts.args(),
        });
        self.check_failure("rsync")?;
        if !on_stdout_line("sending incremental file list") {
            return Err(HalError::Other("rsync cancelled".to_string()));
        }
        Ok(())
    }
}

impl ContainerOps for FakeHal {
    fn container_run(
        &self,
        run: &ContainerRun,
        on_output_line: &mut dyn FnMut(&str),
    ) -> HalResult<()> {
        self.record_operation(Operation::ContainerRun {
            engine: run.engine.clone(),
            argv: run.argv(),
        });
        self.check_failure(&run.engine)?;
        on_output_line(&format!("Installing image: {}", run.image));
        Ok(())
    }
}
