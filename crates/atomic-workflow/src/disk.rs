//! Disk mutator: wipe, partition, format, capture UUIDs.

use crate::arming::ExecuteArmToken;
use crate::config::InstallLayout;
use crate::model::{PartitionMap, PartitionRole};
use crate::mounts::release_conventional_mounts;
use crate::planner::{FsKind, PartitionPlan};
use anyhow::{Context, Result};
use atomic_error::InstallError;
use atomic_hal::procfs::mountinfo;
use atomic_hal::{InstallerHal, PartedOp};
use log::info;
use std::path::Path;

/// Fail unless `disk` is an existing block device.
pub fn ensure_block_device<H: InstallerHal + ?Sized>(hal: &H, disk: &Path) -> Result<()> {
    let is_block = hal
        .is_block_device(disk)
        .with_context(|| format!("failed to stat {}", disk.display()))?;
    if is_block {
        return Ok(());
    }
    if disk.exists() {
        Err(InstallError::NotBlockDevice(disk.to_path_buf()).into())
    } else {
        Err(InstallError::DiskNotFound(disk.to_path_buf()).into())
    }
}

/// Fail if anything from `disk` is still mounted.
pub fn ensure_not_mounted<H: InstallerHal + ?Sized>(hal: &H, disk: &Path) -> Result<()> {
    let info = hal
        .proc_mountinfo()
        .context("failed to read /proc/self/mountinfo")?;
    let mounted = mountinfo::mounted_under_device(&info, disk);
    if mounted.is_empty() {
        return Ok(());
    }
    Err(InstallError::DiskInUse {
        disk: disk.to_path_buf(),
        mounts: mounted.join(", "),
    }
    .into())
}

/// Destroy everything on `disk` and lay it out according to `plan`.
///
/// Returns the role map with every formatted partition's UUID filled in. The first failing step
/// aborts the whole operation; nothing is retried.
pub fn apply<H: InstallerHal + ?Sized>(
    hal: &H,
    disk: &Path,
    plan: &PartitionPlan,
    layout: &InstallLayout,
    token: &ExecuteArmToken,
) -> Result<PartitionMap> {
    ensure_block_device(hal, disk)?;

    release_conventional_mounts(hal, layout);
    ensure_not_mounted(hal, disk)?;

    // The device may have vanished while mounts were being released.
    ensure_block_device(hal, disk).context("target disk changed before wipe")?;

    info!("🧹 Wiping signatures on {}", disk.display());
    hal.wipefs_all(disk, &token.wipefs_options())
        .with_context(|| format!("wipefs --all {}", disk.display()))?;

    write_partition_table(hal, disk, plan, token)?;

    hal.udev_settle().context("udevadm settle after partitioning")?;

    let devices = hal
        .lsblk_partitions(disk)
        .with_context(|| format!("failed to list partitions of {}", disk.display()))?;
    let mut map = PartitionMap::from_devices(disk, plan, &devices)
        .with_context(|| format!("partition table of {} does not match the plan", disk.display()))?;

    format_partitions(hal, plan, &map, token)?;
    capture_uuids(hal, plan, &mut map)?;

    info!("✅ Disk {} prepared ({} partitions)", disk.display(), plan.len());
    Ok(map)
}

fn write_partition_table<H: InstallerHal + ?Sized>(
    hal: &H,
    disk: &Path,
    plan: &PartitionPlan,
    token: &ExecuteArmToken,
) -> Result<()> {
    let opts = token.parted_options();
    let parted = |op: PartedOp| {
        let words = op.args().join(" ");
        hal.parted(disk, op, &opts)
            .with_context(|| format!("parted -s {} {}", disk.display(), words))
    };

    parted(PartedOp::MkLabel {
        label: "gpt".to_string(),
    })?;

    for (idx, spec) in plan.specs().iter().enumerate() {
        let part_num = idx as u32 + 1;
        info!(
            "🧩 Creating {} partition #{} ({} .. {})",
            spec.role, part_num, spec.start, spec.end
        );
        parted(PartedOp::MkPart {
            part_type: "primary".to_string(),
            fs_type: spec.filesystem.map(|fs| fs.parted_name().to_string()),
            start: spec.start.to_string(),
            end: spec.end.to_string(),
        })?;
        parted(PartedOp::Name {
            part_num,
            label: spec.label.to_string(),
        })?;
        for flag in &spec.flags {
            parted(PartedOp::SetFlag {
                part_num,
                flag: flag.to_string(),
                state: "on".to_string(),
            })?;
        }
    }
    Ok(())
}

fn format_partitions<H: InstallerHal + ?Sized>(
    hal: &H,
    plan: &PartitionPlan,
    map: &PartitionMap,
    token: &ExecuteArmToken,
) -> Result<()> {
    let opts = token.format_options();
    for spec in plan.specs() {
        let Some(fs) = spec.filesystem else {
            continue;
        };
        let part = map
            .get(spec.role)
            .ok_or(InstallError::MissingRole(spec.role.as_str()))?;
        let device = &part.device;
        info!("🧱 Formatting {} ({}) as {}", device.display(), spec.role, fs.parted_name());
        let result = match fs {
            FsKind::Fat32 => hal.format_vfat(device, &opts),
            FsKind::Ext4 => hal.format_ext4(device, &opts),
            FsKind::Btrfs => hal.format_btrfs(device, &opts),
        };
        result.with_context(|| {
            format!("failed to format {} partition {}", spec.role, device.display())
        })?;
    }
    Ok(())
}

fn capture_uuids<H: InstallerHal + ?Sized>(
    hal: &H,
    plan: &PartitionPlan,
    map: &mut PartitionMap,
) -> Result<()> {
    let formatted: Vec<PartitionRole> = plan
        .specs()
        .iter()
        .filter(|s| s.filesystem.is_some())
        .map(|s| s.role)
        .collect();
    for role in formatted {
        let part = map
            .get_mut(role)
            .ok_or(InstallError::MissingRole(role.as_str()))?;
        let uuid = hal
            .blkid_uuid(&part.device)
            .with_context(|| format!("blkid {}", part.device.display()))?;
        if uuid.is_empty() {
            return Err(InstallError::EmptyUuid(part.device.clone()).into());
        }
        info!("🔖 {} {} UUID={}", role, part.device.display(), uuid);
        part.uuid = Some(uuid);
    }
    Ok(())
}
