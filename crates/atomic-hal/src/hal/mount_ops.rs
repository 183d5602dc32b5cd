//! Mount operations trait.

use crate::HalResult;
use std::path::Path;

/// Trait for mounting and unmounting filesystems.
pub trait MountOps {
    /// Mount `source` on `target` (`mount [-o <options>] <source> <target>`).
    ///
    /// The target directory must already exist.
    fn mount(&self, source: &Path, target: &Path, options: &MountOptions) -> HalResult<()>;

    /// Unmount `target` (`umount <target>`). Fails if nothing is mounted there.
    fn unmount(&self, target: &Path) -> HalResult<()>;

    /// Check if `path` is currently a mount point.
    fn is_mounted(&self, path: &Path) -> HalResult<bool>;
}

/// Mount options and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Comma-separated option string (e.g. `subvol=@,compress=zstd:1`). `None` means defaults.
    pub options: Option<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: impl Into<String>) -> Self {
        let options = options.into();
        Self {
            options: (!options.is_empty()).then_some(options),
        }
    }

    pub fn subvol(name: &str) -> Self {
        Self::with_options(format!("subvol={}", name))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.options.as_deref()
    }
}
