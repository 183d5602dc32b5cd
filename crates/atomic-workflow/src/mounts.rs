//! Mount manager: directory creation, idempotent unmounts, ordered mount plans.

use crate::config::InstallLayout;
use anyhow::{Context, Result};
use atomic_error::InstallError;
use atomic_hal::{unmount_if_mounted, MountOps, MountOptions, MountStack};
use std::fs;
use std::path::{Path, PathBuf};

/// Create `target` and mount `source` on it.
pub fn mount<H: MountOps + ?Sized>(
    hal: &H,
    source: &Path,
    target: &Path,
    options: &MountOptions,
) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("failed to create mount point {}", target.display()))?;
    hal.mount(source, target, options).with_context(|| {
        format!(
            "failed to mount {} on {}{}",
            source.display(),
            target.display(),
            options
                .as_str()
                .map(|o| format!(" (-o {})", o))
                .unwrap_or_default()
        )
    })?;
    log::info!("📂 Mounted {} on {}", source.display(), target.display());
    Ok(())
}

/// Unmount `target` if it is mounted. Never fails; see [`unmount_if_mounted`].
pub fn unmount<H: MountOps + ?Sized>(hal: &H, target: &Path) {
    unmount_if_mounted(hal, target);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: PathBuf,
    pub options: MountOptions,
}

/// Ordered list of mounts; parents must come before their children.
#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    specs: Vec<MountSpec>,
}

impl MountPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        mut self,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        options: MountOptions,
    ) -> Self {
        self.specs.push(MountSpec {
            source: source.into(),
            target: target.into(),
            options,
        });
        self
    }

    pub fn specs(&self) -> &[MountSpec] {
        &self.specs
    }

    /// Reject any target listed before a target it is nested in.
    pub fn validate(&self) -> Result<(), InstallError> {
        for (idx, child) in self.specs.iter().enumerate() {
            for parent in &self.specs[idx + 1..] {
                if child.target != parent.target && child.target.starts_with(&parent.target) {
                    return Err(InstallError::MountOrder {
                        child: child.target.clone(),
                        parent: parent.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Mount everything in order. The returned stack unmounts in reverse when dropped; on a
    /// failed mount, whatever was already mounted is unwound before the error is returned.
    pub fn mount_all<'a, H: MountOps + ?Sized>(&self, hal: &'a H) -> Result<MountStack<'a, H>> {
        self.validate()?;
        let mut stack = MountStack::new(hal);
        for spec in &self.specs {
            mount(hal, &spec.source, &spec.target, &spec.options)?;
            stack.push(spec.target.clone());
        }
        Ok(stack)
    }
}

/// Best-effort unmount of every conventional mount point, leftovers from an earlier run included.
pub fn release_conventional_mounts<H: MountOps + ?Sized>(hal: &H, layout: &InstallLayout) {
    for target in layout.conventional_targets() {
        unmount_if_mounted(hal, &target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomic_hal::{FakeHal, Operation};
    use tempfile::tempdir;

    #[test]
    fn mount_creates_target_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        let hal = FakeHal::new();
        mount(&hal, Path::new("/dev/sda3"), &target, &MountOptions::new()).unwrap();
        assert!(target.is_dir());
        assert!(hal.is_mounted(&target).unwrap());
    }

    #[test]
    fn mount_failure_names_source_and_target() {
        let dir = tempdir().unwrap();
        let hal = FakeHal::new();
        hal.fail_program("mount");
        let err = mount(
            &hal,
            Path::new("/dev/sda3"),
            &dir.path().join("t"),
            &MountOptions::subvol("@"),
        )
        .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("/dev/sda3"));
        assert!(msg.contains("subvol=@"));
    }

    #[test]
    fn unmount_of_unmounted_target_records_no_umount() {
        let hal = FakeHal::new();
        unmount(&hal, Path::new("/mnt/target"));
        unmount(&hal, Path::new("/mnt/target"));
        assert!(!hal.has_operation(|op| matches!(op, Operation::Unmount { .. })));
    }

    #[test]
    fn repeated_unmount_only_unmounts_once() {
        let hal = FakeHal::new();
        hal.seed_mount("/dev/sda3", "/mnt/target");
        unmount(&hal, Path::new("/mnt/target"));
        unmount(&hal, Path::new("/mnt/target"));
        let count = hal
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::Unmount { .. }))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn plan_rejects_child_before_parent() {
        let plan = MountPlan::new()
            .push("/dev/sda2", "/mnt/target/boot", MountOptions::new())
            .push("/dev/sda3", "/mnt/target", MountOptions::new());
        assert!(matches!(
            plan.validate(),
            Err(InstallError::MountOrder { .. })
        ));
    }

    #[test]
    fn failed_mount_unwinds_earlier_mounts() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("target");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let hal = FakeHal::new();
        let plan = MountPlan::new()
            .push("/dev/sda3", &root, MountOptions::new())
            .push("/dev/sda2", blocker.join("boot"), MountOptions::new());

        assert!(plan.mount_all(&hal).is_err());
        assert!(!hal.is_mounted(&root).unwrap());
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Unmount { target } if target == &root
        )));
    }

    #[test]
    fn release_conventional_mounts_unmounts_children_first() {
        let hal = FakeHal::new();
        let layout = InstallLayout::default();
        hal.seed_mount("/dev/sda3", "/mnt/target");
        hal.seed_mount("/dev/sda1", "/mnt/target/boot/efi");
        release_conventional_mounts(&hal, &layout);
        let unmounts: Vec<PathBuf> = hal
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Unmount { target } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(
            unmounts,
            vec![
                PathBuf::from("/mnt/target/boot/efi"),
                PathBuf::from("/mnt/target")
            ]
        );
        assert!(hal.mounted_targets().is_empty());
    }
}
