//! End-to-end provisioning pipeline.

use crate::arming::ExecuteArmToken;
use crate::config::InstallerConfig;
use crate::deploy::{self, DeployOptions};
use crate::model::{BootMode, ImageRef, PartitionMap, RootFilesystemKind};
use crate::planner::{plan_with_temp_size, PartitionPlan};
use crate::preflight::{self, PreflightConfig};
use crate::{disk, fstab, migrate, mounts, reclaim, subvolumes};
use anyhow::{Context, Result};
use atomic_hal::{InstallerHal, MountGuard, MountOptions};
use log::info;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub image: ImageRef,
    pub disk: PathBuf,
    pub boot_mode: BootMode,
    pub root_fs: RootFilesystemKind,
    pub preflight: PreflightConfig,
}

impl InstallRequest {
    pub fn new(
        image: ImageRef,
        disk: PathBuf,
        boot_mode: BootMode,
        root_fs: RootFilesystemKind,
        cfg: &InstallerConfig,
    ) -> Self {
        let preflight =
            PreflightConfig::for_install(&disk, root_fs, &cfg.container_engine, cfg.min_disk_gb);
        Self {
            image,
            disk,
            boot_mode,
            root_fs,
            preflight,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub map: PartitionMap,
    pub fstab: PathBuf,
    pub subvolumes_created: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StagePlan {
    pub name: &'static str,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub partitions: PartitionPlan,
    pub stages: Vec<StagePlan>,
}

impl InstallPlan {
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec!["Execution plan:".to_string()];
        for (idx, stage) in self.stages.iter().enumerate() {
            lines.push(format!("{:02}. {}: {}", idx + 1, stage.name, stage.description));
        }
        lines.extend(self.partitions.summary_lines());
        lines
    }
}

pub fn build_plan(request: &InstallRequest, cfg: &InstallerConfig) -> InstallPlan {
    let partitions = plan_with_temp_size(request.boot_mode, request.root_fs, cfg.temp_partition_mib);
    let layout = &cfg.layout;
    let btrfs = request.root_fs.is_btrfs();
    let skipped = |desc: String| {
        if btrfs {
            desc
        } else {
            "Skipped (ext4 root)".to_string()
        }
    };

    let stages = vec![
        StagePlan {
            name: "Preflight",
            description: "Root, binaries and target disk checks".to_string(),
        },
        StagePlan {
            name: "Disk",
            description: format!(
                "Wipe {} and create {} partitions ({})",
                request.disk.display(),
                partitions.len(),
                request.boot_mode
            ),
        },
        StagePlan {
            name: "Subvolumes",
            description: skipped(format!(
                "Create {}",
                subvolumes::SUBVOLUMES.join(", ")
            )),
        },
        StagePlan {
            name: "Workspace",
            description: format!("Mount temp partition at {}", layout.workspace.display()),
        },
        StagePlan {
            name: "Deploy",
            description: format!(
                "Install {} with {} into {}",
                request.image,
                cfg.container_engine,
                layout.target.display()
            ),
        },
        StagePlan {
            name: "Relocate",
            description: skipped("Move /var and /home into @var and @home".to_string()),
        },
        StagePlan {
            name: "Fstab",
            description: "Write <deployment>/etc/fstab keyed by UUID".to_string(),
        },
        StagePlan {
            name: "Reclaim",
            description: "Delete temp partition and grow root to 100%".to_string(),
        },
    ];

    InstallPlan { partitions, stages }
}

fn stage<T>(name: &str, run: impl FnOnce() -> Result<T>) -> Result<T> {
    info!("▶️  Stage: {}", name);
    let out = run().with_context(|| format!("stage {}", name))?;
    info!("✔️  Stage {} complete", name);
    Ok(out)
}

/// Provision `request.disk` and deploy `request.image` onto it.
///
/// Stages run strictly in order; the first failure stops the run and is returned with the stage
/// name attached. Mounts taken by a stage are released before the error propagates.
pub fn run_install<H: InstallerHal + ?Sized>(
    hal: &H,
    request: &InstallRequest,
    cfg: &InstallerConfig,
    token: &ExecuteArmToken,
) -> Result<InstallReport> {
    let install_plan = build_plan(request, cfg);
    for line in install_plan.summary_lines() {
        info!("{}", line);
    }
    let plan = &install_plan.partitions;
    let layout = &cfg.layout;
    let root_fs = request.root_fs;

    // Leftovers from an interrupted run would otherwise fail the mounted-disk check.
    mounts::release_conventional_mounts(hal, layout);
    stage("Preflight", || preflight::run(hal, &request.preflight))?;

    let map = stage("Disk", || {
        disk::apply(hal, &request.disk, plan, layout, token)
    })?;

    let subvolumes_created = if root_fs.is_btrfs() {
        stage("Subvolumes", || {
            subvolumes::create_subvolumes(hal, &map.root.device, layout)
        })?
    } else {
        Vec::new()
    };

    let workspace = stage("Workspace", || {
        mounts::mount(hal, &map.temp.device, &layout.workspace, &MountOptions::new())?;
        Ok(MountGuard::new(hal, &layout.workspace))
    })?;

    let deploy_opts = DeployOptions::from_config(cfg);
    stage("Deploy", || {
        deploy::deploy(
            hal,
            &request.image,
            &map,
            request.boot_mode,
            root_fs,
            layout,
            &deploy_opts,
        )
    })?;

    if root_fs.is_btrfs() {
        stage("Relocate", || migrate::relocate(hal, &map, layout))?;
    }

    let fstab = stage("Fstab", || {
        fstab::write_boot_config(hal, &map, root_fs, layout)
    })?;

    stage("Reclaim", || reclaim::reclaim(hal, &map, plan, layout, token))?;
    drop(workspace);

    hal.sync().context("final sync")?;

    info!(
        "🎉 Installed {} on {} (root {})",
        request.image,
        request.disk.display(),
        map.root.device.display()
    );
    Ok(InstallReport {
        map,
        fstab,
        subvolumes_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(boot_mode: BootMode, root_fs: RootFilesystemKind) -> InstallRequest {
        InstallRequest::new(
            ImageRef::new("quay.io/example/os:latest"),
            PathBuf::from("/dev/vdb"),
            boot_mode,
            root_fs,
            &InstallerConfig::default(),
        )
    }

    #[test]
    fn plan_lists_every_stage_in_order() {
        let plan = build_plan(
            &request(BootMode::Uefi, RootFilesystemKind::Btrfs),
            &InstallerConfig::default(),
        );
        let names: Vec<&str> = plan.stages.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "Preflight",
                "Disk",
                "Subvolumes",
                "Workspace",
                "Deploy",
                "Relocate",
                "Fstab",
                "Reclaim"
            ]
        );
        let lines = plan.summary_lines();
        assert_eq!(lines[0], "Execution plan:");
        assert!(lines[1].starts_with("01. Preflight"));
        assert!(lines.iter().any(|l| l.contains("Partition plan")));
    }

    #[test]
    fn ext4_plan_marks_btrfs_stages_skipped() {
        let plan = build_plan(
            &request(BootMode::Legacy, RootFilesystemKind::Ext4),
            &InstallerConfig::default(),
        );
        assert_eq!(plan.partitions.len(), 5);
        let relocate = plan.stages.iter().find(|s| s.name == "Relocate").unwrap();
        assert!(relocate.description.starts_with("Skipped"));
    }

    #[test]
    fn request_preflight_follows_filesystem_and_engine() {
        let mut cfg = InstallerConfig::default();
        cfg.container_engine = "docker".to_string();
        let req = InstallRequest::new(
            ImageRef::new("img"),
            PathBuf::from("/dev/vdb"),
            BootMode::Uefi,
            RootFilesystemKind::Ext4,
            &cfg,
        );
        assert_eq!(req.preflight.target_disk, Some(PathBuf::from("/dev/vdb")));
        assert!(req.preflight.required_binaries.contains(&"docker".to_string()));
        assert!(req.preflight.required_binaries.contains(&"resize2fs".to_string()));
    }
}
