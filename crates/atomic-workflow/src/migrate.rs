//! Post-install relocation of `/var` and `/home` into their own btrfs subvolumes.

use crate::config::InstallLayout;
use crate::model::PartitionMap;
use crate::mounts::MountPlan;
use crate::subvolumes::{HOME_SUBVOLUME, ROOT_SUBVOLUME, VAR_SUBVOLUME};
use anyhow::{Context, Result};
use atomic_error::{InstallError, InstallResult};
use atomic_hal::{InstallerHal, MountOptions, RsyncOptions};
use log::{debug, info};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// `<checksum>.<serial>`, e.g. `3f2a...e1.0`.
fn is_deployment_name(name: &str) -> bool {
    let Some((checksum, serial)) = name.rsplit_once('.') else {
        return false;
    };
    !checksum.is_empty()
        && checksum.chars().all(|c| c.is_ascii_hexdigit())
        && !serial.is_empty()
        && serial.chars().all(|c| c.is_ascii_digit())
}

/// Locate the single active deployment under `root/ostree/deploy/<stateroot>/deploy/`.
pub fn find_deployment(root: &Path) -> InstallResult<PathBuf> {
    let base = root.join("ostree").join("deploy");
    let mut found: Vec<PathBuf> = WalkDir::new(&base)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|p| p == "deploy")
        })
        .filter(|entry| is_deployment_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    found.sort();

    match found.len() {
        0 => Err(InstallError::DeploymentNotFound(root.to_path_buf())),
        1 => Ok(found.remove(0)),
        _ => Err(InstallError::AmbiguousDeployment {
            root: root.to_path_buf(),
            candidates: found
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Resolve `<deployment>/home`, following a symlink (ostree ships `home -> var/home`) while
/// staying inside the deployment.
fn resolve_home(deployment: &Path) -> Option<PathBuf> {
    let home = deployment.join("home");
    let meta = fs::symlink_metadata(&home).ok()?;
    let resolved = if meta.file_type().is_symlink() {
        let link = fs::read_link(&home).ok()?;
        let relative: PathBuf = link
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        deployment.join(relative)
    } else {
        home
    };
    resolved.is_dir().then_some(resolved)
}

fn copy_tree<H: InstallerHal + ?Sized>(hal: &H, src: &Path, dst: &Path) -> Result<()> {
    info!("📦 Copying {} -> {}", src.display(), dst.display());
    let mut log_line = |line: &str| {
        debug!("[rsync] {}", line);
        true
    };
    hal.rsync_stream_stdout(src, dst, &RsyncOptions::preserve_all(), &mut log_line)
        .with_context(|| format!("rsync {}/ -> {} failed", src.display(), dst.display()))
}

/// Remove everything inside `dir`, keeping `dir` itself.
fn clear_directory(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        let meta = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Move the deployment's `/var` and `/home` into `@var` and `@home`.
///
/// The in-place `var/` is emptied only after both copies succeeded, so a failure leaves a
/// duplicate rather than a missing `/var`.
pub fn relocate<H: InstallerHal + ?Sized>(
    hal: &H,
    map: &PartitionMap,
    layout: &InstallLayout,
) -> Result<()> {
    let root = &map.root.device;
    let stack = MountPlan::new()
        .push(root, &layout.target, MountOptions::subvol(ROOT_SUBVOLUME))
        .push(root, &layout.btrfs_var, MountOptions::subvol(VAR_SUBVOLUME))
        .push(root, &layout.btrfs_home, MountOptions::subvol(HOME_SUBVOLUME))
        .mount_all(hal)
        .context("failed to mount subvolumes for relocation")?;

    let deployment = find_deployment(&layout.target)?;
    info!("Active deployment: {}", deployment.display());

    let var = deployment.join("var");
    if var.is_dir() {
        copy_tree(hal, &var, &layout.btrfs_var)?;
    } else {
        info!("Deployment has no var/ directory; nothing to relocate");
    }

    match resolve_home(&deployment) {
        Some(home) => copy_tree(hal, &home, &layout.btrfs_home)?,
        None => info!("Deployment has no home/ directory; skipping"),
    }

    if var.is_dir() {
        clear_directory(&var)?;
        info!("🧽 Cleared {}", var.display());
    }

    stack.unwind();
    Ok(())
}
