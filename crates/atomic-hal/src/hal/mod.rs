//! HAL trait definitions and implementations.
//!
//! Each concern gets its own trait so workflow code can ask for exactly what it touches.
//! [`LinuxHal`] shells out to the real tools; [`FakeHal`] records and simulates.

pub mod btrfs_ops;
pub mod container_ops;
pub mod fake_hal;
pub mod format_ops;
pub mod guards;
pub mod host_info_ops;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod probe_ops;
pub mod resize_ops;
pub mod rsync_ops;
pub mod system_ops;

pub use btrfs_ops::{parse_subvolume_paths, BtrfsOps};
pub use container_ops::{ContainerOps, ContainerRun};
pub use fake_hal::{FakeHal, Operation};
pub use format_ops::{FormatOps, FormatOptions};
pub use guards::{unmount_if_mounted, MountGuard, MountStack};
pub use host_info_ops::HostInfoOps;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use partition_ops::{PartedOp, PartedOptions, PartitionOps, WipeFsOptions};
pub use probe_ops::{parse_lsblk_partitions, ProbeOps};
pub use resize_ops::{ResizeOps, ResizeOptions};
pub use rsync_ops::{RsyncOps, RsyncOptions};
pub use system_ops::SystemOps;

/// Complete HAL used by the installer pipeline.
pub trait InstallerHal:
    MountOps
    + PartitionOps
    + FormatOps
    + ProbeOps
    + BtrfsOps
    + ResizeOps
    + RsyncOps
    + ContainerOps
    + SystemOps
    + HostInfoOps
    + Send
    + Sync
{
}

impl<T> InstallerHal for T where
    T: MountOps
        + PartitionOps
        + FormatOps
        + ProbeOps
        + BtrfsOps
        + ResizeOps
        + RsyncOps
        + ContainerOps
        + SystemOps
        + HostInfoOps
        + Send
        + Sync
{
}
