//! Block device naming helpers.

use std::path::{Path, PathBuf};

/// Kernel naming for partition `num` of `disk`. nvme/mmcblk/loop disks get a `p` separator.
pub fn partition_path(disk: &Path, num: u32) -> PathBuf {
    let disk = disk.to_string_lossy();
    if needs_p_separator(&disk) {
        PathBuf::from(format!("{}p{}", disk, num))
    } else {
        PathBuf::from(format!("{}{}", disk, num))
    }
}

/// Accepts `sda` or `/dev/sda` and returns the absolute device path.
pub fn normalize_device(device: &str) -> PathBuf {
    let trimmed = device.trim();
    if trimmed.starts_with('/') {
        PathBuf::from(trimmed)
    } else {
        Path::new("/dev").join(trimmed)
    }
}

/// Map a partition device back to its whole-disk device (`/dev/nvme0n1p3` -> `/dev/nvme0n1`).
pub fn parent_disk(device: &str) -> Option<String> {
    let name = device.strip_prefix("/dev/")?;
    let base = if needs_p_separator(name) {
        match name.rfind('p') {
            Some(idx)
                if idx > 0
                    && idx + 1 < name.len()
                    && name[..idx].ends_with(|c: char| c.is_ascii_digit())
                    && name[idx + 1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                &name[..idx]
            }
            _ => name,
        }
    } else {
        let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if trimmed.is_empty() {
            name
        } else {
            trimmed
        }
    };
    Some(format!("/dev/{}", base))
}

fn needs_p_separator(name: &str) -> bool {
    name.contains("nvme") || name.contains("mmcblk") || name.contains("loop")
}
