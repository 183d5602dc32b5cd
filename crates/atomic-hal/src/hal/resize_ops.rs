//! Offline ext4 check and grow.

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ResizeOptions {
    pub confirmed: bool,
}

impl ResizeOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}

pub trait ResizeOps {
    /// `e2fsck -f -y <device>`. Exit status 1 (errors corrected) counts as success.
    fn e2fsck_force(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()>;

    /// `resize2fs <device>`, growing the filesystem to fill its partition.
    fn resize2fs(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()>;
}
