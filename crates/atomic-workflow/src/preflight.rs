use crate::config::DEFAULT_MIN_DISK_GB;
use crate::model::RootFilesystemKind;
use anyhow::{Context, Result};
use atomic_error::HalError;
use atomic_hal::path::parent_disk;
use atomic_hal::procfs::mountinfo;
use atomic_hal::sysfs::block;
use atomic_hal::{HostInfoOps, ProbeOps};
use log::info;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const BASE_BINARIES: &[&str] = &[
    "wipefs",
    "parted",
    "mkfs.vfat",
    "mkfs.ext4",
    "mount",
    "umount",
    "mountpoint",
    "blkid",
    "lsblk",
    "udevadm",
];
const BTRFS_BINARIES: &[&str] = &["mkfs.btrfs", "btrfs", "rsync"];
const EXT4_BINARIES: &[&str] = &["e2fsck", "resize2fs"];

/// External tools a run with `root_fs` will invoke.
pub fn required_binaries(root_fs: RootFilesystemKind, engine: &str) -> Vec<String> {
    let extra = match root_fs {
        RootFilesystemKind::Btrfs => BTRFS_BINARIES,
        RootFilesystemKind::Ext4 => EXT4_BINARIES,
    };
    BASE_BINARIES
        .iter()
        .chain(extra)
        .map(|b| b.to_string())
        .chain(std::iter::once(engine.to_string()))
        .collect()
}

#[derive(Clone, Debug)]
pub struct PreflightConfig {
    pub target_disk: Option<PathBuf>,
    pub min_disk_gb: u64,
    pub required_binaries: Vec<String>,
    pub sys_class_block: PathBuf,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            target_disk: None,
            min_disk_gb: DEFAULT_MIN_DISK_GB,
            required_binaries: required_binaries(RootFilesystemKind::Btrfs, "podman"),
            sys_class_block: PathBuf::from(block::SYS_CLASS_BLOCK),
        }
    }
}

impl PreflightConfig {
    pub fn for_install(
        disk: &Path,
        root_fs: RootFilesystemKind,
        engine: &str,
        min_disk_gb: u64,
    ) -> Self {
        Self {
            target_disk: Some(disk.to_path_buf()),
            min_disk_gb,
            required_binaries: required_binaries(root_fs, engine),
            ..Self::default()
        }
    }
}

pub fn run<H: ProbeOps + HostInfoOps + ?Sized>(hal: &H, cfg: &PreflightConfig) -> Result<()> {
    info!("🧪 Preflight checks");

    if !hal.is_effective_root() {
        return Err(HalError::PermissionDenied)
            .context("the installer must run as root (effective UID 0)");
    }
    if let Some(disk) = &cfg.target_disk {
        check_target_disk(hal, disk, &cfg.sys_class_block, cfg.min_disk_gb)?;
    }
    check_binaries(&cfg.required_binaries)?;

    info!("✅ Preflight complete");
    Ok(())
}

fn check_target_disk<H: ProbeOps + HostInfoOps + ?Sized>(
    hal: &H,
    path: &Path,
    sys_class_block: &Path,
    min_disk_gb: u64,
) -> Result<()> {
    let is_block = hal
        .is_block_device(path)
        .with_context(|| format!("target disk {} not accessible", path.display()))?;
    if !is_block {
        anyhow::bail!(
            "Target disk {} is not a block device; please provide the correct device path",
            path.display()
        );
    }

    let name = block::device_basename(path)?;
    let sys_path = sys_class_block.join(&name);
    if !sys_path.exists() {
        anyhow::bail!(
            "Target disk {} is not recognized in {}; is this a valid /dev block device name?",
            path.display(),
            sys_class_block.display()
        );
    }
    if block::is_partition_in(sys_class_block, &name) {
        anyhow::bail!(
            "Target disk {} appears to be a partition; please pass the whole disk (e.g. /dev/sda, not /dev/sda1)",
            path.display()
        );
    }

    let info = hal
        .proc_mountinfo()
        .context("failed to read /proc/self/mountinfo")?;
    if let Some(root_source) = mountinfo::root_mount_source(&info) {
        let root_disk = parent_disk(&root_source).unwrap_or(root_source);
        if Path::new(&root_disk) == path {
            anyhow::bail!(
                "Target disk {} holds the running system's root filesystem; refusing to continue.",
                path.display()
            );
        }
    }

    let mounted = mountinfo::mounted_under_device(&info, path);
    if !mounted.is_empty() {
        anyhow::bail!(
            "Target disk {} has mounted filesystems: {}. Unmount them before continuing.",
            path.display(),
            mounted.join(", ")
        );
    }

    let size_bytes = block::block_device_size_bytes(&sys_path)
        .with_context(|| format!("failed to read size for {}", path.display()))?;
    let size_gib = size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if size_gib < min_disk_gb as f64 {
        anyhow::bail!(
            "Target disk {} is too small: {:.1} GiB ({} GiB required)",
            path.display(),
            size_gib,
            min_disk_gb
        );
    }
    Ok(())
}

fn check_binaries(bins: &[String]) -> Result<()> {
    let path = env::var_os("PATH").unwrap_or_default();
    let entries = env::split_paths(&path).collect::<Vec<_>>();
    for bin in bins {
        let Some(found) = find_in_paths(bin, &entries) else {
            return Err(HalError::CommandNotFound(bin.clone()))
                .context(format!("Required binary '{}' not found in PATH", bin));
        };
        ensure_executable(&found).with_context(|| {
            format!(
                "Required binary '{}' was found at {} but is not executable",
                bin,
                found.display()
            )
        })?;
    }
    Ok(())
}

fn ensure_executable(path: &Path) -> Result<()> {
    let md = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if !md.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if md.permissions().mode() & 0o111 == 0 {
            anyhow::bail!("{} is not executable", path.display());
        }
    }
    Ok(())
}

fn find_in_paths(binary: &str, paths: &[PathBuf]) -> Option<PathBuf> {
    paths
        .iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.exists())
}
