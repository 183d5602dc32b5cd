use atomic_error::InstallError;
use atomic_hal::{FakeHal, MountOps, Operation, ProbeOps};
use atomic_workflow::{
    run_install, BootMode, ExecuteArmToken, ImageRef, InstallLayout, InstallRequest,
    InstallerConfig, PreflightConfig, RootFilesystemKind,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DISK: &str = "/dev/vdb";
const DEPLOYMENT: &str = "ostree/deploy/default/deploy/9f3c2a71.0";

struct Harness {
    _dir: TempDir,
    hal: FakeHal,
    cfg: InstallerConfig,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let cfg = InstallerConfig {
            layout: InstallLayout::under(dir.path()),
            ..InstallerConfig::default()
        };
        Self {
            _dir: dir,
            hal: FakeHal::with_disk(DISK),
            cfg,
        }
    }

    fn layout(&self) -> &InstallLayout {
        &self.cfg.layout
    }

    /// Stand in for what `bootc install` leaves on the target tree.
    fn seed_deployment(&self) -> PathBuf {
        let deployment = self.layout().target.join(DEPLOYMENT);
        fs::create_dir_all(deployment.join("var/lib/containers")).expect("seed var");
        fs::write(deployment.join("var/lib/containers/marker"), "x").expect("seed file");
        fs::create_dir_all(deployment.join("etc")).expect("seed etc");
        deployment
    }

    fn request(&self, boot_mode: BootMode, root_fs: RootFilesystemKind) -> InstallRequest {
        let mut request = InstallRequest::new(
            ImageRef::new("quay.io/fedora/fedora-bootc:41"),
            PathBuf::from(DISK),
            boot_mode,
            root_fs,
            &self.cfg,
        );
        request.preflight = PreflightConfig {
            target_disk: None,
            required_binaries: Vec::new(),
            ..PreflightConfig::default()
        };
        request
    }

    fn count(&self, check: impl Fn(&Operation) -> bool) -> usize {
        self.hal.operations().iter().filter(|op| check(op)).count()
    }
}

fn token() -> ExecuteArmToken {
    ExecuteArmToken::try_new(true, true).expect("armed token")
}

fn mount_targets(ops: &[Operation]) -> Vec<PathBuf> {
    ops.iter()
        .filter_map(|op| match op {
            Operation::Mount { target, .. } => Some(target.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn legacy_ext4_install_end_to_end() {
    let h = Harness::new();
    let deployment = h.seed_deployment();
    let request = h.request(BootMode::Legacy, RootFilesystemKind::Ext4);

    let report = run_install(&h.hal, &request, &h.cfg, &token()).expect("install");

    assert!(report.map.bios.is_some());
    assert_eq!(report.map.root.device, PathBuf::from("/dev/vdb4"));
    assert_eq!(report.map.temp.device, PathBuf::from("/dev/vdb5"));
    assert!(report.subvolumes_created.is_empty());
    assert_eq!(h.count(|op| matches!(op, Operation::BtrfsSubvolumeCreate { .. })), 0);
    assert_eq!(h.count(|op| matches!(op, Operation::Rsync { .. })), 0);

    // Temp partition gone, root grown offline.
    assert_eq!(h.hal.partition_numbers(Path::new(DISK)), vec![1, 2, 3, 4]);
    assert!(h.hal.has_operation(|op| matches!(
        op,
        Operation::Resize2fs { device } if device == Path::new("/dev/vdb4")
    )));

    assert_eq!(report.fstab, deployment.join("etc/fstab"));
    let fstab = fs::read_to_string(&report.fstab).expect("fstab");
    assert!(fstab.contains(" / ext4 "));
    assert!(!fstab.contains("subvol="));

    // ext4 root keeps /var inside the deployment.
    assert!(deployment.join("var/lib/containers/marker").is_file());
    assert!(h.hal.mounted_targets().is_empty());
    assert!(matches!(h.hal.operations().last(), Some(Operation::Sync)));
}

#[test]
fn uefi_btrfs_install_end_to_end() {
    let h = Harness::new();
    let deployment = h.seed_deployment();
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Btrfs);

    let report = run_install(&h.hal, &request, &h.cfg, &token()).expect("install");

    assert!(report.map.bios.is_none());
    assert_eq!(report.map.root.device, PathBuf::from("/dev/vdb3"));
    assert_eq!(report.subvolumes_created, vec!["@", "@home", "@var"]);

    let first_container = h
        .hal
        .position(|op| matches!(op, Operation::ContainerRun { .. }))
        .expect("container ran");
    let last_subvolume = h
        .hal
        .operations()
        .iter()
        .rposition(|op| matches!(op, Operation::BtrfsSubvolumeCreate { .. }))
        .expect("subvolumes created");
    assert!(last_subvolume < first_container);
    assert_eq!(h.count(|op| matches!(op, Operation::BtrfsSubvolumeCreate { .. })), 3);

    // /var was copied into @var and emptied in place.
    assert!(h.hal.has_operation(|op| matches!(
        op,
        Operation::Rsync { dst, .. } if dst == &h.layout().btrfs_var
    )));
    assert_eq!(fs::read_dir(deployment.join("var")).expect("var").count(), 0);

    let fstab = fs::read_to_string(&report.fstab).expect("fstab");
    assert!(fstab.contains("subvol=@var"));
    assert!(fstab.contains("subvol=@home"));
    assert!(h.hal.has_operation(|op| matches!(
        op,
        Operation::BtrfsResizeMax { mount_point } if mount_point == &h.layout().btrfs_top
    )));
    assert_eq!(h.hal.partition_numbers(Path::new(DISK)), vec![1, 2, 3]);
    assert!(h.hal.mounted_targets().is_empty());
}

#[test]
fn deploy_mounts_parents_before_children_and_unwinds_in_reverse() {
    let h = Harness::new();
    h.seed_deployment();
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Ext4);
    run_install(&h.hal, &request, &h.cfg, &token()).expect("install");

    let ops = h.hal.operations();
    let container = ops
        .iter()
        .position(|op| matches!(op, Operation::ContainerRun { .. }))
        .expect("container ran");
    let layout = h.layout();

    let before: Vec<PathBuf> = mount_targets(&ops[..container])
        .into_iter()
        .filter(|t| t.starts_with(&layout.target))
        .collect();
    assert_eq!(
        before,
        vec![
            layout.target.clone(),
            layout.boot_mount(),
            layout.efi_mount()
        ]
    );

    let after: Vec<PathBuf> = ops[container..]
        .iter()
        .filter_map(|op| match op {
            Operation::Unmount { target } => Some(target.clone()),
            _ => None,
        })
        .take(3)
        .collect();
    assert_eq!(
        after,
        vec![
            layout.efi_mount(),
            layout.boot_mount(),
            layout.target.clone()
        ]
    );
}

#[test]
fn fstab_references_the_uuids_captured_after_formatting() {
    let h = Harness::new();
    h.seed_deployment();
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Btrfs);

    let report = run_install(&h.hal, &request, &h.cfg, &token()).expect("install");
    let fstab = fs::read_to_string(&report.fstab).expect("fstab");

    for part in [&report.map.root, &report.map.boot, &report.map.efi] {
        let captured = part.uuid().expect("uuid captured");
        assert_eq!(h.hal.blkid_uuid(&part.device).expect("blkid"), captured);
        assert!(fstab.contains(&format!("UUID={} ", captured)));
    }
    assert!(!fstab.contains("/dev/"));
}

#[test]
fn rerun_reclaim_after_success_fails_closed() {
    let h = Harness::new();
    h.seed_deployment();
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Ext4);
    let report = run_install(&h.hal, &request, &h.cfg, &token()).expect("install");

    let plan = atomic_workflow::plan(BootMode::Uefi, RootFilesystemKind::Ext4);
    h.hal.clear();
    let err = atomic_workflow::reclaim::reclaim(&h.hal, &report.map, &plan, h.layout(), &token())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InstallError>(),
        Some(InstallError::TempPartitionMissing { .. })
    ));
    assert!(!h.hal.has_operation(|op| matches!(op, Operation::Parted { .. })));
}

#[test]
fn deploy_failure_stops_before_fstab_and_leaves_nothing_mounted() {
    let h = Harness::new();
    let deployment = h.seed_deployment();
    h.hal.fail_program("podman");
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Btrfs);

    let err = run_install(&h.hal, &request, &h.cfg, &token()).unwrap_err();

    let chain = format!("{:#}", err);
    assert!(chain.contains("stage Deploy"), "{}", chain);
    assert!(chain.contains("exit code 1"), "{}", chain);
    assert!(!deployment.join("etc/fstab").exists());
    assert_eq!(h.count(|op| matches!(op, Operation::Rsync { .. })), 0);
    assert!(!h.hal.has_operation(|op| matches!(
        op,
        Operation::Parted { args, .. } if args.first().map(String::as_str) == Some("rm")
    )));
    for target in h.layout().conventional_targets() {
        assert!(!h.hal.is_mounted(&target).expect("mount state"));
    }
    // Temp partition survives for a retry.
    assert_eq!(h.hal.partition_numbers(Path::new(DISK)), vec![1, 2, 3, 4]);
}

#[test]
fn rerun_after_interrupted_install_releases_stale_mounts() {
    let h = Harness::new();
    h.seed_deployment();
    let sys = TempDir::new().expect("sysfs dir");
    fs::create_dir_all(sys.path().join("vdb")).expect("sysfs disk");
    fs::write(sys.path().join("vdb/size"), format!("{}\n", 64u64 * 2 * 1024 * 1024))
        .expect("sysfs size");

    let mut request = h.request(BootMode::Uefi, RootFilesystemKind::Btrfs);
    request.preflight.target_disk = Some(PathBuf::from(DISK));
    request.preflight.sys_class_block = sys.path().to_path_buf();

    // A killed earlier run left its workspace and top-level mounts behind.
    h.hal.seed_mount("/dev/vdb3", &h.layout().btrfs_top);
    h.hal.seed_mount("/dev/vdb4", &h.layout().workspace);

    let report = run_install(&h.hal, &request, &h.cfg, &token()).expect("install");

    let ops = h.hal.operations();
    let wipe = ops
        .iter()
        .position(|op| matches!(op, Operation::WipeFsAll { .. }))
        .expect("disk wiped");
    let released: Vec<&PathBuf> = ops[..wipe]
        .iter()
        .filter_map(|op| match op {
            Operation::Unmount { target } => Some(target),
            _ => None,
        })
        .collect();
    assert!(released.contains(&&h.layout().workspace));
    assert!(released.contains(&&h.layout().btrfs_top));
    assert_eq!(report.map.root.device, PathBuf::from("/dev/vdb3"));
    assert!(h.hal.mounted_targets().is_empty());
}

#[test]
fn unarmed_run_is_refused_before_touching_the_disk() {
    let err = ExecuteArmToken::try_new(false, true).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InstallError>(),
        Some(InstallError::MissingYesIKnow)
    ));
}

#[test]
fn preflight_failure_leaves_disk_untouched() {
    let h = Harness::new();
    h.hal.set_effective_root(false);
    let request = h.request(BootMode::Uefi, RootFilesystemKind::Btrfs);

    let err = run_install(&h.hal, &request, &h.cfg, &token()).unwrap_err();

    assert!(format!("{:#}", err).contains("stage Preflight"));
    assert!(!h.hal.has_operation(|op| matches!(op, Operation::WipeFsAll { .. })));
    assert!(!h.hal.has_operation(|op| matches!(op, Operation::Parted { .. })));
}
