//! Helpers related to block devices in sysfs.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const SYS_BLOCK: &str = "/sys/block";
pub const SYS_CLASS_BLOCK: &str = "/sys/class/block";

pub fn device_basename(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid device path {}", path.display()))?
        .to_string_lossy()
        .to_string();
    Ok(name)
}

/// Reads the block device size from `<sysfs dir>/size` (512-byte sectors).
pub fn block_device_size_bytes(sys_block_dev_dir: &Path) -> Result<u64> {
    let sectors_str = fs::read_to_string(sys_block_dev_dir.join("size"))?;
    let sectors: u64 = sectors_str.trim().parse()?;
    Ok(sectors.saturating_mul(512))
}

/// True when `/sys/class/block/<name>/partition` exists, i.e. the device is a partition.
pub fn is_partition_in(sys_class_block: &Path, name: &str) -> bool {
    sys_class_block.join(name).join("partition").exists()
}

#[derive(Debug, Clone)]
pub struct BlockDeviceInfo {
    pub name: String,
    pub dev_path: PathBuf,
    pub size_bytes: u64,
    pub model: Option<String>,
    pub removable: bool,
}

impl BlockDeviceInfo {
    pub fn size_gib(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

pub fn scan_block_devices() -> Result<Vec<BlockDeviceInfo>> {
    scan_block_devices_in(Path::new(SYS_BLOCK))
}

/// Whole disks under `sys_block_root`, sorted by name. Virtual devices and empty media are skipped.
pub fn scan_block_devices_in(sys_block_root: &Path) -> Result<Vec<BlockDeviceInfo>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(sys_block_root)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if should_skip_block_device(&name) {
            continue;
        }
        let sysfs_path = sys_block_root.join(&name);
        let size_bytes = match block_device_size_bytes(&sysfs_path) {
            Ok(v) if v > 0 => v,
            _ => continue,
        };

        let model = read_trimmed(sysfs_path.join("device/model"));
        let removable = read_trimmed(sysfs_path.join("removable")).as_deref() == Some("1");

        out.push(BlockDeviceInfo {
            dev_path: PathBuf::from("/dev").join(&name),
            name,
            size_bytes,
            model,
            removable,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn read_trimmed(path: PathBuf) -> Option<String> {
    let s = fs::read_to_string(path).ok()?;
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn should_skip_block_device(name: &str) -> bool {
    name.starts_with("loop")
        || name.starts_with("ram")
        || name.starts_with("zram")
        || name.starts_with("dm-")
        || name.starts_with("md")
        || name.starts_with("sr")
}
