//! fstab generation for the deployed system.

use crate::config::InstallLayout;
use crate::migrate::find_deployment;
use crate::model::{PartitionMap, RootFilesystemKind};
use crate::mounts;
use crate::subvolumes::{HOME_SUBVOLUME, ROOT_SUBVOLUME, VAR_SUBVOLUME};
use anyhow::{Context, Result};
use atomic_error::InstallError;
use atomic_hal::{InstallerHal, MountGuard, MountOptions};
use log::info;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FSTAB_HEADER: &str = "# /etc/fstab generated by atomic-installer";
const BTRFS_OPTIONS: &str = "compress=zstd:1,x-systemd.device-timeout=0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabUuids {
    pub root: String,
    pub boot: String,
    pub efi: String,
}

impl FstabUuids {
    pub fn from_map(map: &PartitionMap) -> Result<Self, InstallError> {
        Ok(Self {
            root: map.root.uuid()?.to_string(),
            boot: map.boot.uuid()?.to_string(),
            efi: map.efi.uuid()?.to_string(),
        })
    }
}

pub fn render_fstab(uuids: &FstabUuids, root_fs: RootFilesystemKind) -> String {
    let mut lines = vec![FSTAB_HEADER.to_string()];
    match root_fs {
        RootFilesystemKind::Btrfs => {
            for (mount_point, subvol) in [
                ("/", ROOT_SUBVOLUME),
                ("/home", HOME_SUBVOLUME),
                ("/var", VAR_SUBVOLUME),
            ] {
                lines.push(format!(
                    "UUID={} {} btrfs subvol={},{} 0 0",
                    uuids.root, mount_point, subvol, BTRFS_OPTIONS
                ));
            }
        }
        RootFilesystemKind::Ext4 => {
            lines.push(format!("UUID={} / ext4 defaults 1 1", uuids.root));
        }
    }
    lines.push(format!("UUID={} /boot ext4 defaults 1 2", uuids.boot));
    lines.push(format!(
        "UUID={} /boot/efi vfat umask=0077,shortname=winnt 0 2",
        uuids.efi
    ));
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("atomic-installer.tmp");
    let mut file = File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Write `<deployment>/etc/fstab` under `mount_point`. Returns the file path.
pub fn generate_fstab(
    mount_point: &Path,
    map: &PartitionMap,
    root_fs: RootFilesystemKind,
) -> Result<PathBuf> {
    let deployment = find_deployment(mount_point)?;
    let uuids = FstabUuids::from_map(map)?;
    let etc = deployment.join("etc");
    fs::create_dir_all(&etc).with_context(|| format!("failed to create {}", etc.display()))?;

    let path = etc.join("fstab");
    write_atomic(&path, &render_fstab(&uuids, root_fs))?;
    info!("📝 Wrote {}", path.display());
    Ok(path)
}

/// Fail if a partition's filesystem UUID no longer matches the one captured after formatting.
pub fn verify_uuids<H: InstallerHal + ?Sized>(hal: &H, map: &PartitionMap) -> Result<()> {
    for part in [&map.root, &map.boot, &map.efi] {
        let before = part.uuid()?;
        let after = hal
            .blkid_uuid(&part.device)
            .with_context(|| format!("blkid {}", part.device.display()))?;
        if before != after {
            return Err(InstallError::UuidChanged {
                device: part.device.clone(),
                before: before.to_string(),
                after,
            }
            .into());
        }
    }
    Ok(())
}

/// Mount the deployed root and write its fstab, after re-checking every UUID it references.
pub fn write_boot_config<H: InstallerHal + ?Sized>(
    hal: &H,
    map: &PartitionMap,
    root_fs: RootFilesystemKind,
    layout: &InstallLayout,
) -> Result<PathBuf> {
    verify_uuids(hal, map)?;

    let opts = if root_fs.is_btrfs() {
        MountOptions::subvol(ROOT_SUBVOLUME)
    } else {
        MountOptions::new()
    };
    mounts::mount(hal, &map.root.device, &layout.target, &opts)?;
    let _guard = MountGuard::new(hal, &layout.target);

    generate_fstab(&layout.target, map, root_fs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Partition, PartitionRole};
    use atomic_hal::{FakeHal, MountOps};
    use tempfile::tempdir;

    fn uuids() -> FstabUuids {
        FstabUuids {
            root: "R".to_string(),
            boot: "B".to_string(),
            efi: "E".to_string(),
        }
    }

    fn map() -> PartitionMap {
        let part = |role, number: u32, uuid: &str| Partition {
            role,
            number,
            device: PathBuf::from(format!("/dev/vdb{}", number)),
            uuid: Some(uuid.to_string()),
        };
        PartitionMap {
            disk: PathBuf::from("/dev/vdb"),
            bios: None,
            efi: part(PartitionRole::Efi, 1, "E"),
            boot: part(PartitionRole::Boot, 2, "B"),
            root: part(PartitionRole::Root, 3, "R"),
            temp: part(PartitionRole::Temp, 4, "T"),
        }
    }

    fn hal_with_uuids() -> FakeHal {
        let hal = FakeHal::new();
        hal.set_uuid("/dev/vdb1", "E");
        hal.set_uuid("/dev/vdb2", "B");
        hal.set_uuid("/dev/vdb3", "R");
        hal
    }

    #[test]
    fn btrfs_fstab_lines() {
        let text = render_fstab(&uuids(), RootFilesystemKind::Btrfs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                FSTAB_HEADER,
                "UUID=R / btrfs subvol=@,compress=zstd:1,x-systemd.device-timeout=0 0 0",
                "UUID=R /home btrfs subvol=@home,compress=zstd:1,x-systemd.device-timeout=0 0 0",
                "UUID=R /var btrfs subvol=@var,compress=zstd:1,x-systemd.device-timeout=0 0 0",
                "UUID=B /boot ext4 defaults 1 2",
                "UUID=E /boot/efi vfat umask=0077,shortname=winnt 0 2",
            ]
        );
    }

    #[test]
    fn ext4_fstab_has_no_subvolume_lines() {
        let text = render_fstab(&uuids(), RootFilesystemKind::Ext4);
        assert!(text.contains("UUID=R / ext4 defaults 1 1\n"));
        assert!(!text.contains("/home"));
        assert!(!text.contains("/var"));
        assert!(!text.contains("/dev/"));
        for line in text.lines().skip(1) {
            assert_eq!(line.split_whitespace().count(), 6, "{}", line);
        }
    }

    #[test]
    fn generate_writes_into_deployment_etc() {
        let dir = tempdir().unwrap();
        let deployment = dir.path().join("ostree/deploy/default/deploy/0a1b.0");
        fs::create_dir_all(&deployment).unwrap();

        let path = generate_fstab(dir.path(), &map(), RootFilesystemKind::Ext4).unwrap();

        assert_eq!(path, deployment.join("etc/fstab"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(FSTAB_HEADER));
        assert!(!deployment.join("etc/fstab.atomic-installer.tmp").exists());
    }

    #[test]
    fn generate_without_deployment_fails() {
        let dir = tempdir().unwrap();
        let err = generate_fstab(dir.path(), &map(), RootFilesystemKind::Ext4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::DeploymentNotFound(_))
        ));
    }

    #[test]
    fn changed_uuid_is_detected_before_writing() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under(dir.path());
        let hal = hal_with_uuids();
        hal.set_uuid("/dev/vdb2", "B-reformatted");

        let err = write_boot_config(&hal, &map(), RootFilesystemKind::Btrfs, &layout).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::UuidChanged { .. })
        ));
        assert!(hal.mounted_targets().is_empty());
    }

    #[test]
    fn write_boot_config_mounts_root_subvolume_and_unmounts() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under(dir.path());
        fs::create_dir_all(layout.target.join("ostree/deploy/default/deploy/0a1b.0")).unwrap();
        let hal = hal_with_uuids();

        let path = write_boot_config(&hal, &map(), RootFilesystemKind::Btrfs, &layout).unwrap();

        assert!(path.is_file());
        assert!(!hal.is_mounted(&layout.target).unwrap());
    }
}
