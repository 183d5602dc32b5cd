//! Device probing operations (lsblk/blkid).

use crate::HalResult;
use std::path::{Path, PathBuf};

/// Probing operations trait.
pub trait ProbeOps {
    /// Whether `path` exists and is a block device.
    fn is_block_device(&self, path: &Path) -> HalResult<bool>;

    /// Partition device paths of `disk` in physical order (`lsblk -ln -o NAME,TYPE <disk>`).
    fn lsblk_partitions(&self, disk: &Path) -> HalResult<Vec<PathBuf>>;

    /// Return a human-readable lsblk table for diagnostics.
    fn lsblk_table(&self, disk: &Path) -> HalResult<String>;

    /// Return the filesystem UUID of a block device (`blkid -s UUID -o value`).
    fn blkid_uuid(&self, device: &Path) -> HalResult<String>;
}

/// Parse `lsblk -ln -o NAME,TYPE` output into `/dev/<name>` paths for `part` rows.
pub fn parse_lsblk_partitions(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let kind = fields.next()?;
            if kind != "part" || name.starts_with("zram") || name.starts_with("loop") {
                return None;
            }
            let name = name.trim_start_matches("/dev/");
            Some(Path::new("/dev").join(name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lsblk_partitions_keeps_part_rows_in_order() {
        let out = "sda   disk\nsda1  part\nsda2  part\nsda10 part\nzram0 disk\n";
        assert_eq!(
            parse_lsblk_partitions(out),
            vec![
                PathBuf::from("/dev/sda1"),
                PathBuf::from("/dev/sda2"),
                PathBuf::from("/dev/sda10"),
            ]
        );
    }

    #[test]
    fn parse_lsblk_partitions_handles_empty_table() {
        assert!(parse_lsblk_partitions("nvme0n1 disk\n").is_empty());
    }
}
