//! Provisioning pipeline: plan -> partition/format -> subvolumes -> deploy -> relocate ->
//! fstab -> reclaim.
//!
//! Every stage takes the HAL by reference and the [`PartitionMap`] by shared reference; nothing
//! is kept in global state between stages.

pub mod arming;
pub mod config;
pub mod deploy;
pub mod disk;
pub mod fstab;
pub mod migrate;
pub mod model;
pub mod mounts;
pub mod pipeline;
pub mod planner;
pub mod preflight;
pub mod reclaim;
pub mod subvolumes;

#[cfg(test)]
pub(crate) mod test_env;

pub use arming::ExecuteArmToken;
pub use config::{GenericImagePolicy, InstallLayout, InstallerConfig};
pub use model::{BootMode, ImageRef, Partition, PartitionMap, PartitionRole, RootFilesystemKind};
pub use pipeline::{build_plan, run_install, InstallPlan, InstallReport, InstallRequest};
pub use preflight::PreflightConfig;
pub use planner::{plan, plan_with_temp_size, Boundary, PartitionPlan, PartitionSpec};
