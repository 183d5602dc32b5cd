//! btrfs operations used by the subvolume layout and the final root grow.

use crate::HalResult;
use std::path::Path;

pub trait BtrfsOps {
    /// `btrfs subvolume list <mount_point>`
    fn btrfs_subvolume_list(&self, mount_point: &Path) -> HalResult<String>;

    /// `btrfs subvolume create <path>`
    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()>;

    /// `btrfs filesystem resize max <mount_point>`; the filesystem must be mounted.
    fn btrfs_resize_max(&self, mount_point: &Path) -> HalResult<()>;
}

/// Subvolume paths from `btrfs subvolume list` output
/// (`ID 256 gen 7 top level 5 path @home`).
pub fn parse_subvolume_paths(list_output: &str) -> Vec<String> {
    list_output
        .lines()
        .filter_map(|line| line.split_once(" path ").map(|(_, p)| p.trim().to_string()))
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_subvolume_paths_reads_path_column() {
        let out = "ID 256 gen 9 top level 5 path @\nID 257 gen 9 top level 5 path @home\n";
        assert_eq!(parse_subvolume_paths(out), vec!["@", "@home"]);
        assert!(parse_subvolume_paths("").is_empty());
    }
}
