//! Hardware abstraction layer for the atomic installer.
//!
//! Everything that touches the outside world (block devices, mount table, external commands)
//! goes through the traits in [`hal`], so the provisioning workflow can be exercised against
//! [`FakeHal`] without root or real disks.

pub mod hal;
pub mod path;
pub mod procfs;
pub mod sysfs;

pub use atomic_error::{HalError, HalResult};
pub use hal::*;
