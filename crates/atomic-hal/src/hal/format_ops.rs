//! Filesystem formatting operations trait.

use crate::HalResult;
use std::path::Path;

/// Trait for creating filesystems on block devices.
pub trait FormatOps {
    /// `mkfs.ext4 <device>`
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()>;

    /// `mkfs.btrfs -f <device>`
    fn format_btrfs(&self, device: &Path, opts: &FormatOptions) -> HalResult<()>;

    /// `mkfs.vfat -F32 <device>`, used for the EFI system partition.
    fn format_vfat(&self, device: &Path, opts: &FormatOptions) -> HalResult<()>;
}

/// Options for formatting operations.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// The operator has confirmed the destructive operation.
    pub confirmed: bool,
}

impl FormatOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}
