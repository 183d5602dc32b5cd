//! Reclaim the scratch partition: delete it and grow root into the freed space.

use crate::arming::ExecuteArmToken;
use crate::config::InstallLayout;
use crate::model::{PartitionMap, RootFilesystemKind};
use crate::mounts;
use crate::planner::PartitionPlan;
use anyhow::{Context, Result};
use atomic_error::InstallError;
use atomic_hal::{InstallerHal, MountGuard, MountOptions, PartedOp};
use log::{info, warn};
use std::path::Path;

/// Check that the table still looks exactly like the plan, with the temp partition last.
///
/// Runs before anything is deleted; a table that has already lost the temp partition (an
/// earlier run died half-way) is refused rather than trimmed further.
pub fn verify_reclaimable<H: InstallerHal + ?Sized>(
    hal: &H,
    map: &PartitionMap,
    plan: &PartitionPlan,
) -> Result<()> {
    let disk = &map.disk;
    let devices = hal
        .lsblk_partitions(disk)
        .with_context(|| format!("failed to list partitions of {}", disk.display()))?;
    let expected = plan.len();

    if devices.len() + 1 == expected && !devices.contains(&map.temp.device) {
        return Err(InstallError::TempPartitionMissing {
            disk: disk.clone(),
            found: devices.len(),
        }
        .into());
    }
    if devices.len() != expected {
        return Err(InstallError::PartitionCountMismatch {
            disk: disk.clone(),
            expected,
            found: devices.len(),
        }
        .into());
    }

    let root_slot = (map.root.number as usize)
        .checked_sub(1)
        .and_then(|idx| devices.get(idx));
    let checks = [
        (devices.last(), &map.temp.device),
        (root_slot, &map.root.device),
    ];
    for (found, expected) in checks {
        match found {
            Some(found) if found == expected => {}
            found => {
                return Err(InstallError::UnexpectedPartition {
                    expected: expected.clone(),
                    found: found.cloned().unwrap_or_default(),
                }
                .into())
            }
        }
    }
    Ok(())
}

fn grow_root_filesystem<H: InstallerHal + ?Sized>(
    hal: &H,
    root: &Path,
    root_fs: RootFilesystemKind,
    layout: &InstallLayout,
    token: &ExecuteArmToken,
) -> Result<()> {
    match root_fs {
        RootFilesystemKind::Btrfs => {
            let top = &layout.btrfs_top;
            mounts::mount(hal, root, top, &MountOptions::new())?;
            let _guard = MountGuard::new(hal, top);
            hal.btrfs_resize_max(top)
                .with_context(|| format!("btrfs filesystem resize max {}", top.display()))?;
        }
        RootFilesystemKind::Ext4 => {
            let opts = token.resize_options();
            hal.e2fsck_force(root, &opts)
                .with_context(|| format!("e2fsck -f -y {}", root.display()))?;
            hal.resize2fs(root, &opts)
                .with_context(|| format!("resize2fs {}", root.display()))?;
        }
    }
    Ok(())
}

pub fn reclaim<H: InstallerHal + ?Sized>(
    hal: &H,
    map: &PartitionMap,
    plan: &PartitionPlan,
    layout: &InstallLayout,
    token: &ExecuteArmToken,
) -> Result<()> {
    let disk = &map.disk;
    mounts::unmount(hal, &layout.workspace);

    verify_reclaimable(hal, map, plan)?;

    let opts = token.parted_options();
    info!("🗑️  Removing temp partition {}", map.temp.device.display());
    hal.parted(
        disk,
        PartedOp::Rm {
            part_num: map.temp.number,
        },
        &opts,
    )
    .with_context(|| format!("parted -s {} rm {}", disk.display(), map.temp.number))?;

    info!("📏 Growing partition {} to the end of the disk", map.root.device.display());
    hal.parted(
        disk,
        PartedOp::ResizePart {
            part_num: map.root.number,
            end: "100%".to_string(),
        },
        &opts,
    )
    .with_context(|| {
        format!(
            "parted -s {} resizepart {} 100%",
            disk.display(),
            map.root.number
        )
    })?;
    hal.udev_settle().context("udevadm settle after resizepart")?;

    grow_root_filesystem(hal, &map.root.device, plan.root_fs(), layout, token)?;
    info!("✅ Root filesystem on {} grown", map.root.device.display());

    match hal.lsblk_table(disk) {
        Ok(table) => table.lines().for_each(|line| info!("  {}", line)),
        Err(err) => warn!("lsblk {} failed: {}", disk.display(), err),
    }
    Ok(())
}
