//! Parsing helpers for `/proc/self/mountinfo`.
//!
//! Line format:
//!   `<id> <parent> <major:minor> <root> <mount point> <opts> [optional...] - <fstype> <source> <superopts>`

use crate::path::parent_disk;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub fstype: String,
    pub source: String,
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<MountInfo> {
    let (pre, post) = line.split_once(" - ")?;
    let mount_point = pre.split_whitespace().nth(4)?;
    let mut post_fields = post.split_whitespace();
    let fstype = post_fields.next()?.to_string();
    let source = post_fields.next()?.to_string();
    Some(MountInfo {
        mount_point: PathBuf::from(unescape_mount_path(mount_point)),
        fstype,
        source,
    })
}

pub fn is_mounted_from_info(path: &Path, entries: &[MountInfo]) -> bool {
    let target = normalize_path(path);
    entries
        .iter()
        .any(|entry| normalize_path(&entry.mount_point) == target)
}

/// Mount points whose source is `disk` itself or one of its partitions.
pub fn mounted_under_device(mountinfo: &str, disk: &Path) -> Vec<String> {
    let disk = disk.to_string_lossy();
    let mut mounts: Vec<String> = parse_mountinfo(mountinfo)
        .into_iter()
        .filter(|entry| {
            entry.source == disk || parent_disk(&entry.source).as_deref() == Some(disk.as_ref())
        })
        .map(|entry| entry.mount_point.to_string_lossy().to_string())
        .collect();

    mounts.sort();
    mounts.dedup();
    mounts
}

pub fn root_mount_source(mountinfo: &str) -> Option<String> {
    parse_mountinfo(mountinfo)
        .into_iter()
        .find(|entry| entry.mount_point == Path::new("/"))
        .map(|entry| entry.source)
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
36 28 0:31 / / rw,relatime - ext4 /dev/sda3 rw
37 28 0:32 / /boot rw,relatime - ext4 /dev/sda2 rw
38 28 0:33 /@var /mnt/btrfs_var rw,relatime shared:1 - btrfs /dev/nvme0n1p3 rw,subvol=/@var
39 28 0:34 / /mnt/other rw,relatime - ext4 /dev/sdaa1 rw
";

    #[test]
    fn parse_mountinfo_extracts_fields() {
        let entries = parse_mountinfo(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].mount_point, PathBuf::from("/"));
        assert_eq!(entries[2].fstype, "btrfs");
        assert_eq!(entries[2].source, "/dev/nvme0n1p3");
    }

    #[test]
    fn is_mounted_from_info_ignores_trailing_slash() {
        let entries = parse_mountinfo(SAMPLE);
        assert!(is_mounted_from_info(Path::new("/boot/"), &entries));
        assert!(!is_mounted_from_info(Path::new("/mnt/target"), &entries));
    }

    #[test]
    fn mountinfo_unescapes_paths() {
        let sample = "36 28 0:31 / /mnt/data\\040disk rw,relatime - ext4 /dev/sda3 rw\n";
        let entries = parse_mountinfo(sample);
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/data disk"));
    }

    #[test]
    fn mounted_under_device_matches_partitions_only_of_that_disk() {
        let mounts = mounted_under_device(SAMPLE, Path::new("/dev/sda"));
        assert_eq!(mounts, vec!["/".to_string(), "/boot".to_string()]);

        let nvme = mounted_under_device(SAMPLE, Path::new("/dev/nvme0n1"));
        assert_eq!(nvme, vec!["/mnt/btrfs_var".to_string()]);
    }

    #[test]
    fn root_mount_source_extracts_device() {
        assert_eq!(root_mount_source(SAMPLE), Some("/dev/sda3".to_string()));
        assert_eq!(root_mount_source(""), None);
    }
}
