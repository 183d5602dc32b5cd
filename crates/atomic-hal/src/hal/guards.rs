use crate::MountOps;
use std::path::{Path, PathBuf};

/// Unmount `target` only if it is currently a mount point.
///
/// Returns whether something was unmounted. Failures are logged and swallowed: this runs on
/// cleanup paths where an error would mask the failure that triggered the cleanup.
pub fn unmount_if_mounted<H: MountOps + ?Sized>(hal: &H, target: &Path) -> bool {
    match hal.is_mounted(target) {
        Ok(false) => return false,
        Ok(true) => {}
        Err(err) => {
            log::warn!(
                "could not determine mount state of {}: {}; trying umount anyway",
                target.display(),
                err
            );
        }
    }
    match hal.unmount(target) {
        Ok(()) => {
            log::info!("🔌 Unmounted {}", target.display());
            true
        }
        Err(err) => {
            log::warn!("failed to unmount {}: {}", target.display(), err);
            false
        }
    }
}

/// RAII guard that unmounts a target path when dropped.
#[derive(Debug)]
pub struct MountGuard<'a, H: MountOps + ?Sized> {
    hal: &'a H,
    target: PathBuf,
}

impl<'a, H: MountOps + ?Sized> MountGuard<'a, H> {
    /// Take ownership of an existing mount at `target`.
    pub fn new(hal: &'a H, target: impl Into<PathBuf>) -> Self {
        Self {
            hal,
            target: target.into(),
        }
    }
}

impl<'a, H: MountOps + ?Sized> Drop for MountGuard<'a, H> {
    fn drop(&mut self) {
        unmount_if_mounted(self.hal, &self.target);
    }
}

/// Ordered set of mounts, unwound in exact reverse order when dropped.
#[derive(Debug)]
pub struct MountStack<'a, H: MountOps + ?Sized> {
    hal: &'a H,
    targets: Vec<PathBuf>,
}

impl<'a, H: MountOps + ?Sized> MountStack<'a, H> {
    pub fn new(hal: &'a H) -> Self {
        Self {
            hal,
            targets: Vec::new(),
        }
    }

    /// Record a mount that has just succeeded; it is unmounted before anything pushed earlier.
    pub fn push(&mut self, target: impl Into<PathBuf>) {
        self.targets.push(target.into());
    }

    /// Unmount everything now (child mounts first).
    pub fn unwind(mut self) {
        self.unmount_all();
    }

    fn unmount_all(&mut self) {
        while let Some(target) = self.targets.pop() {
            unmount_if_mounted(self.hal, &target);
        }
    }
}

impl<'a, H: MountOps + ?Sized> Drop for MountStack<'a, H> {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
