//! Read-only facts about the running host.

use crate::HalResult;

pub trait HostInfoOps {
    /// Contents of `/proc/self/mountinfo`.
    fn proc_mountinfo(&self) -> HalResult<String>;

    /// Whether the process runs with effective UID 0.
    fn is_effective_root(&self) -> bool;

    /// Whether the firmware exposes EFI variables (`/sys/firmware/efi/efivars`).
    fn uefi_firmware_present(&self) -> bool;
}
