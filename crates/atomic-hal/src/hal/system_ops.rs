//! System-level operations (sync, udev settle).

use crate::HalResult;

/// System operations trait.
pub trait SystemOps {
    /// Flush filesystem buffers.
    fn sync(&self) -> HalResult<()>;

    /// Wait for block device events to quiesce.
    fn udev_settle(&self) -> HalResult<()>;
}
