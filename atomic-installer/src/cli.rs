//! CLI argument parsing for the atomic installer.

use atomic_workflow::{BootMode, RootFilesystemKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BootModeArg {
    /// BIOS boot with a GRUB core partition
    Legacy,
    /// UEFI boot from the EFI system partition
    Uefi,
}

impl From<BootModeArg> for BootMode {
    fn from(arg: BootModeArg) -> Self {
        match arg {
            BootModeArg::Legacy => BootMode::Legacy,
            BootModeArg::Uefi => BootMode::Uefi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilesystemArg {
    Ext4,
    /// Root split into @, @home and @var subvolumes
    Btrfs,
}

impl From<FilesystemArg> for RootFilesystemKind {
    fn from(arg: FilesystemArg) -> Self {
        match arg {
            FilesystemArg::Ext4 => RootFilesystemKind::Ext4,
            FilesystemArg::Btrfs => RootFilesystemKind::Btrfs,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "atomic-installer")]
#[command(version, about = "💿 Install a bootc container image onto a whole disk")]
#[command(long_about = "💿 Install a bootc container image onto a whole disk\n\n\
    Partitions and formats the target disk, deploys the image with bootc running inside the \
    image itself, writes fstab and finally grows the root partition over the scratch space.\n\n\
    Everything on the target disk is destroyed.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Installer configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug log file (overrides log_file from the config)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 💾 Wipe a disk and install an image onto it
    Install {
        /// Container image reference (e.g. quay.io/fedora/fedora-bootc:41)
        #[arg(long)]
        image: String,

        /// Target disk device (e.g. /dev/sda or sda)
        #[arg(long)]
        disk: String,

        /// Boot mode; detected from /sys/firmware/efi when omitted
        #[arg(long, value_enum)]
        boot_mode: Option<BootModeArg>,

        /// Root filesystem
        #[arg(long, value_enum, default_value = "btrfs")]
        filesystem: FilesystemArg,

        /// Confirm destructive operation without prompting
        #[arg(long)]
        yes_i_know: bool,

        /// Print the execution plan and exit without touching the disk
        #[arg(long)]
        dry_run: bool,
    },

    /// 🗺️  Print the partition plan
    Plan {
        /// Boot mode; detected from /sys/firmware/efi when omitted
        #[arg(long, value_enum)]
        boot_mode: Option<BootModeArg>,

        /// Root filesystem
        #[arg(long, value_enum, default_value = "btrfs")]
        filesystem: FilesystemArg,
    },

    /// 📀 List disks large enough to install onto
    Disks,

    /// 🔍 Run preflight checks (root, tools, target disk)
    Preflight {
        /// Target disk device to validate
        #[arg(long)]
        disk: Option<String>,

        /// Root filesystem (selects the required tools)
        #[arg(long, value_enum, default_value = "btrfs")]
        filesystem: FilesystemArg,
    },
}
