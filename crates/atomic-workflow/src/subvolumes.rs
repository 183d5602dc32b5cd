//! Btrfs subvolume layout (`@`, `@home`, `@var`).

use crate::config::InstallLayout;
use crate::mounts;
use anyhow::{Context, Result};
use atomic_hal::{parse_subvolume_paths, InstallerHal, MountGuard, MountOptions};
use log::info;
use std::path::Path;

pub const ROOT_SUBVOLUME: &str = "@";
pub const HOME_SUBVOLUME: &str = "@home";
pub const VAR_SUBVOLUME: &str = "@var";
pub const SUBVOLUMES: [&str; 3] = [ROOT_SUBVOLUME, HOME_SUBVOLUME, VAR_SUBVOLUME];

/// Create the standard subvolumes on the freshly formatted btrfs root.
///
/// Returns the names actually created; ones that already exist are left alone.
pub fn create_subvolumes<H: InstallerHal + ?Sized>(
    hal: &H,
    root_device: &Path,
    layout: &InstallLayout,
) -> Result<Vec<String>> {
    let top = &layout.btrfs_top;
    mounts::mount(hal, root_device, top, &MountOptions::new())
        .context("failed to mount btrfs top-level volume")?;
    let _guard = MountGuard::new(hal, top);

    let listing = hal
        .btrfs_subvolume_list(top)
        .with_context(|| format!("btrfs subvolume list {}", top.display()))?;
    let existing = parse_subvolume_paths(&listing);

    let mut created = Vec::new();
    for name in SUBVOLUMES {
        if existing.iter().any(|p| p == name) {
            info!("Subvolume {} already exists on {}; skipping", name, root_device.display());
            continue;
        }
        let path = top.join(name);
        hal.btrfs_subvolume_create(&path)
            .with_context(|| format!("btrfs subvolume create {}", path.display()))?;
        info!("🌱 Created subvolume {}", name);
        created.push(name.to_string());
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomic_hal::{FakeHal, MountOps, Operation};
    use tempfile::tempdir;

    #[test]
    fn creates_all_three_and_unmounts() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under(dir.path());
        let hal = FakeHal::new();

        let created = create_subvolumes(&hal, Path::new("/dev/vdb3"), &layout).unwrap();

        assert_eq!(created, vec!["@", "@home", "@var"]);
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Mount { options: None, target, .. } if target == &layout.btrfs_top
        )));
        assert!(!hal.is_mounted(&layout.btrfs_top).unwrap());
    }

    #[test]
    fn existing_subvolumes_are_skipped() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under(dir.path());
        let hal = FakeHal::new();
        hal.add_subvolume(layout.btrfs_top.join("@"));

        let created = create_subvolumes(&hal, Path::new("/dev/vdb3"), &layout).unwrap();

        assert_eq!(created, vec!["@home", "@var"]);
        let creates = hal
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::BtrfsSubvolumeCreate { .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[test]
    fn failure_still_unmounts_top_level() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under(dir.path());
        let hal = FakeHal::new();
        hal.fail_program("btrfs");

        assert!(create_subvolumes(&hal, Path::new("/dev/vdb3"), &layout).is_err());
        assert!(!hal.is_mounted(&layout.btrfs_top).unwrap());
    }
}
