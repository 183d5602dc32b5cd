//! Image deployment: mount the target tree and run `bootc install to-filesystem` in the image.

use crate::config::{GenericImagePolicy, InstallLayout, InstallerConfig};
use crate::model::{BootMode, ImageRef, PartitionMap, RootFilesystemKind};
use crate::mounts::MountPlan;
use crate::subvolumes::ROOT_SUBVOLUME;
use anyhow::{Context, Result};
use atomic_hal::{ContainerRun, InstallerHal, MountOptions};
use log::info;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub engine: String,
    pub generic_image: GenericImagePolicy,
}

impl DeployOptions {
    pub fn from_config(cfg: &InstallerConfig) -> Self {
        Self {
            engine: cfg.container_engine.clone(),
            generic_image: cfg.generic_image,
        }
    }
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self::from_config(&InstallerConfig::default())
    }
}

/// Root, then boot, then EFI: parents before children.
pub fn deploy_mount_plan(
    map: &PartitionMap,
    root_fs: RootFilesystemKind,
    layout: &InstallLayout,
) -> MountPlan {
    let root_opts = if root_fs.is_btrfs() {
        MountOptions::subvol(ROOT_SUBVOLUME)
    } else {
        MountOptions::new()
    };
    MountPlan::new()
        .push(&map.root.device, &layout.target, root_opts)
        .push(&map.boot.device, layout.boot_mount(), MountOptions::new())
        .push(&map.efi.device, layout.efi_mount(), MountOptions::new())
}

fn workspace_storage(layout: &InstallLayout) -> PathBuf {
    layout.workspace.join("storage")
}

fn workspace_tmp(layout: &InstallLayout) -> PathBuf {
    layout.workspace.join("tmp")
}

/// Assemble the privileged container invocation.
///
/// Image storage is redirected onto the scratch workspace (`--root`) and the same directory is
/// bound as the container's `/var/lib/containers`, so pulled layers never touch the root
/// partition.
pub fn build_container_run(
    image: &ImageRef,
    map: &PartitionMap,
    boot_mode: BootMode,
    root_fs: RootFilesystemKind,
    layout: &InstallLayout,
    opts: &DeployOptions,
) -> Result<ContainerRun> {
    let root_uuid = map.root.uuid()?;
    let boot_uuid = map.boot.uuid()?;
    let storage = workspace_storage(layout);
    let tmp = workspace_tmp(layout);
    let target = layout.target.display().to_string();

    let mut bootc = vec![
        "bootc".to_string(),
        "install".to_string(),
        "to-filesystem".to_string(),
        "--skip-fetch-check".to_string(),
        "--disable-selinux".to_string(),
    ];
    if opts.generic_image.resolve(boot_mode) {
        bootc.push("--generic-image".to_string());
    }
    bootc.push(format!("--root-mount-spec=UUID={}", root_uuid));
    bootc.push(format!("--boot-mount-spec=UUID={}", boot_uuid));
    if root_fs.is_btrfs() {
        bootc.push(format!("--karg=rootflags=subvol={}", ROOT_SUBVOLUME));
    }
    bootc.push(target.clone());

    Ok(ContainerRun::new(&opts.engine, image.as_str())
        .global_arg("--root")
        .global_arg(storage.display().to_string())
        .run_arg("--rm")
        .run_arg("--privileged")
        .run_arg("--pid=host")
        .run_arg("--security-opt")
        .run_arg("label=type:unconfined_t")
        .run_arg("-v")
        .run_arg(format!("{}:/var/lib/containers", storage.display()))
        .run_arg("-v")
        .run_arg("/dev:/dev")
        .run_arg("-v")
        .run_arg(format!("{}:{}", target, target))
        .run_arg("-v")
        .run_arg(format!("{}:/var/tmp", tmp.display()))
        .command(bootc))
}

/// Mount the target tree, install `image` into it, and unmount it again (on every exit path).
///
/// Expects the scratch workspace to be mounted already.
pub fn deploy<H: InstallerHal + ?Sized>(
    hal: &H,
    image: &ImageRef,
    map: &PartitionMap,
    boot_mode: BootMode,
    root_fs: RootFilesystemKind,
    layout: &InstallLayout,
    opts: &DeployOptions,
) -> Result<()> {
    let run = build_container_run(image, map, boot_mode, root_fs, layout, opts)?;

    for dir in [workspace_storage(layout), workspace_tmp(layout)] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create workspace dir {}", dir.display()))?;
    }

    let stack = deploy_mount_plan(map, root_fs, layout)
        .mount_all(hal)
        .context("failed to mount deployment target")?;

    info!("🚀 Deploying {} with {} ({})", image, opts.engine, boot_mode);
    info!("{} {}", run.engine, run.argv().join(" "));
    let mut forward = |line: &str| info!("[bootc] {}", line);
    hal.container_run(&run, &mut forward).map_err(|err| {
        let code = err
            .exit_code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        anyhow::Error::new(err).context(format!(
            "deployment of {} failed (exit code {})",
            image, code
        ))
    })?;

    stack.unwind();
    info!("✅ Deployed {}", image);
    Ok(())
}
