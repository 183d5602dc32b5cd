pub mod cli;
pub mod confirm;
pub mod logging;

use anyhow::{Context, Result};
use atomic_hal::path::normalize_device;
use atomic_hal::sysfs::block::{scan_block_devices, BlockDeviceInfo};
use atomic_hal::{HostInfoOps, LinuxHal};
use atomic_workflow::preflight::{self, required_binaries, PreflightConfig};
use atomic_workflow::{
    build_plan, plan_with_temp_size, run_install, BootMode, ImageRef, InstallReport,
    InstallRequest, InstallerConfig, RootFilesystemKind,
};
use clap::Parser;
use std::io::{self, IsTerminal};

pub fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    let cfg = InstallerConfig::load_or_default(cli.config.as_deref())?;
    let log_file = cli.log_file.clone().unwrap_or_else(|| cfg.log_file.clone());
    if let Some(path) = logging::init_with(&log_file) {
        log::info!("📜 Debug log: {}", path.display());
    }

    log_failure(execute(&cli, &cfg))
}

/// Record a failed run in the log before handing the error back to `main`.
pub fn log_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        log::error!("❌ {:#}", err);
    }
    result
}

fn execute(cli: &cli::Cli, cfg: &InstallerConfig) -> Result<()> {
    let hal = LinuxHal::new();
    match &cli.command {
        cli::Command::Install {
            image,
            disk,
            boot_mode,
            filesystem,
            yes_i_know,
            dry_run,
        } => {
            let disk = normalize_device(disk);
            let boot_mode = resolve_boot_mode(&hal, boot_mode.map(BootMode::from));
            let request = InstallRequest::new(
                ImageRef::new(image.as_str()),
                disk.clone(),
                boot_mode,
                (*filesystem).into(),
                cfg,
            );

            if *dry_run {
                for line in build_plan(&request, cfg).summary_lines() {
                    println!("{}", line);
                }
                log::info!("Dry run: no changes made to {}", disk.display());
                return Ok(());
            }

            let token = confirm::arm_with(*yes_i_know, io::stdin().is_terminal(), || {
                confirm::confirm_destroy(&disk)
            })?;
            log::info!("💾 Installing {} onto {}", image, disk.display());
            let report = run_install(&hal, &request, cfg, &token)?;
            for line in report_lines(&report) {
                println!("{}", line);
            }
        }
        cli::Command::Plan {
            boot_mode,
            filesystem,
        } => {
            let boot_mode = resolve_boot_mode(&hal, boot_mode.map(BootMode::from));
            let plan = plan_with_temp_size(boot_mode, (*filesystem).into(), cfg.temp_partition_mib);
            for line in plan.summary_lines() {
                println!("{}", line);
            }
        }
        cli::Command::Disks => {
            let devices = scan_block_devices().context("failed to scan /sys/block")?;
            let disks = candidate_disks(devices, cfg.min_disk_gb);
            if disks.is_empty() {
                println!("No disks of at least {} GiB found", cfg.min_disk_gb);
            }
            for disk in &disks {
                println!("{}", disk_line(disk));
            }
        }
        cli::Command::Preflight { disk, filesystem } => {
            log::info!("🔍 Running preflight checks...");
            let root_fs = RootFilesystemKind::from(*filesystem);
            let pf = match disk {
                Some(disk) => PreflightConfig::for_install(
                    &normalize_device(disk),
                    root_fs,
                    &cfg.container_engine,
                    cfg.min_disk_gb,
                ),
                None => PreflightConfig {
                    required_binaries: required_binaries(root_fs, &cfg.container_engine),
                    min_disk_gb: cfg.min_disk_gb,
                    ..PreflightConfig::default()
                },
            };
            preflight::run(&hal, &pf)?;
        }
    }
    Ok(())
}

fn resolve_boot_mode<H: HostInfoOps + ?Sized>(hal: &H, requested: Option<BootMode>) -> BootMode {
    match requested {
        Some(mode) => mode,
        None => {
            let mode = if hal.uefi_firmware_present() {
                BootMode::Uefi
            } else {
                BootMode::Legacy
            };
            log::info!("🧭 Detected boot mode: {}", mode);
            mode
        }
    }
}

/// Whole disks of at least `min_gb` GiB.
pub fn candidate_disks(devices: Vec<BlockDeviceInfo>, min_gb: u64) -> Vec<BlockDeviceInfo> {
    devices
        .into_iter()
        .filter(|d| d.size_gib() >= min_gb as f64)
        .collect()
}

pub fn disk_line(disk: &BlockDeviceInfo) -> String {
    let mut line = format!("{:<14} {:>8.1} GiB", disk.dev_path.display(), disk.size_gib());
    if let Some(model) = &disk.model {
        line.push_str(&format!("  {}", model));
    }
    if disk.removable {
        line.push_str("  (removable)");
    }
    line
}

pub fn report_lines(report: &InstallReport) -> Vec<String> {
    let mut lines = vec!["Installation complete:".to_string()];
    for part in report.map.partitions() {
        if part.role == atomic_workflow::PartitionRole::Temp {
            continue;
        }
        lines.push(format!(
            "  {:<5} {} {}",
            part.role,
            part.device.display(),
            part.uuid.as_deref().unwrap_or("-")
        ));
    }
    if !report.subvolumes_created.is_empty() {
        lines.push(format!(
            "  subvolumes: {}",
            report.subvolumes_created.join(", ")
        ));
    }
    lines.push(format!("  fstab: {}", report.fstab.display()));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomic_hal::FakeHal;
    use std::path::PathBuf;

    fn device(name: &str, gib: u64, model: Option<&str>, removable: bool) -> BlockDeviceInfo {
        BlockDeviceInfo {
            name: name.to_string(),
            dev_path: PathBuf::from("/dev").join(name),
            size_bytes: gib * 1024 * 1024 * 1024,
            model: model.map(str::to_string),
            removable,
        }
    }

    #[test]
    fn small_disks_are_not_candidates() {
        let disks = candidate_disks(
            vec![
                device("sda", 16, None, true),
                device("sdb", 50, None, false),
                device("nvme0n1", 512, Some("WD SN770"), false),
            ],
            50,
        );
        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdb", "nvme0n1"]);
    }

    #[test]
    fn disk_line_shows_model_and_removable() {
        let line = disk_line(&device("sda", 64, Some("USB Stick"), true));
        assert!(line.starts_with("/dev/sda"));
        assert!(line.contains("64.0 GiB"));
        assert!(line.contains("USB Stick"));
        assert!(line.ends_with("(removable)"));
    }

    #[test]
    fn boot_mode_is_detected_only_when_not_given() {
        let hal = FakeHal::new();
        assert_eq!(resolve_boot_mode(&hal, None), BootMode::Legacy);
        hal.set_uefi(true);
        assert_eq!(resolve_boot_mode(&hal, None), BootMode::Uefi);
        assert_eq!(
            resolve_boot_mode(&hal, Some(BootMode::Legacy)),
            BootMode::Legacy
        );
    }
}
