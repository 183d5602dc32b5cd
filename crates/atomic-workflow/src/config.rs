//! Installer configuration (optional TOML file, every key defaulted).

use crate::model::BootMode;
use crate::planner::DEFAULT_TEMP_MIB;
use anyhow::{Context, Result};
use atomic_error::InstallError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MIN_DISK_GB: u64 = 50;
pub const DEFAULT_CONTAINER_ENGINE: &str = "podman";
pub const DEFAULT_LOG_FILE: &str = "/var/log/atomic-installer/install.log";

/// Whether `bootc install` is asked for a generic (firmware-agnostic) bootloader setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericImagePolicy {
    /// On for LEGACY, off for UEFI.
    #[default]
    Auto,
    Always,
    Never,
}

impl GenericImagePolicy {
    pub fn resolve(self, boot_mode: BootMode) -> bool {
        match self {
            GenericImagePolicy::Auto => boot_mode == BootMode::Legacy,
            GenericImagePolicy::Always => true,
            GenericImagePolicy::Never => false,
        }
    }
}

/// Well-known mount points used during a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallLayout {
    pub target: PathBuf,
    pub btrfs_top: PathBuf,
    pub btrfs_var: PathBuf,
    pub btrfs_home: PathBuf,
    pub workspace: PathBuf,
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self {
            target: PathBuf::from("/mnt/target"),
            btrfs_top: PathBuf::from("/mnt/btrfs"),
            btrfs_var: PathBuf::from("/mnt/btrfs_var"),
            btrfs_home: PathBuf::from("/mnt/btrfs_home"),
            workspace: PathBuf::from("/mnt/tmp_workspace"),
        }
    }
}

impl InstallLayout {
    /// Layout rooted under `base` instead of `/mnt` (tests, chroots).
    pub fn under(base: &Path) -> Self {
        Self {
            target: base.join("target"),
            btrfs_top: base.join("btrfs"),
            btrfs_var: base.join("btrfs_var"),
            btrfs_home: base.join("btrfs_home"),
            workspace: base.join("tmp_workspace"),
        }
    }

    pub fn boot_mount(&self) -> PathBuf {
        self.target.join("boot")
    }

    pub fn efi_mount(&self) -> PathBuf {
        self.target.join("boot").join("efi")
    }

    /// Every mount point a run may leave behind, children before parents.
    pub fn conventional_targets(&self) -> Vec<PathBuf> {
        vec![
            self.efi_mount(),
            self.boot_mount(),
            self.target.clone(),
            self.btrfs_var.clone(),
            self.btrfs_home.clone(),
            self.btrfs_top.clone(),
            self.workspace.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    pub temp_partition_mib: u64,
    pub min_disk_gb: u64,
    pub container_engine: String,
    pub log_file: PathBuf,
    pub generic_image: GenericImagePolicy,
    pub layout: InstallLayout,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            temp_partition_mib: DEFAULT_TEMP_MIB,
            min_disk_gb: DEFAULT_MIN_DISK_GB,
            container_engine: DEFAULT_CONTAINER_ENGINE.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            generic_image: GenericImagePolicy::Auto,
            layout: InstallLayout::default(),
        }
    }
}

impl InstallerConfig {
    pub fn parse(toml_text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(toml_text).context("failed to parse installer config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load `path` when given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(InstallError::ValidationFailed(msg).into()) };
        if self.temp_partition_mib == 0 {
            return invalid("temp_partition_mib must be greater than zero".to_string());
        }
        if self.container_engine.trim().is_empty() {
            return invalid("container_engine must not be empty".to_string());
        }
        let layout = &self.layout;
        for (key, path) in [
            ("layout.target", &layout.target),
            ("layout.btrfs_top", &layout.btrfs_top),
            ("layout.btrfs_var", &layout.btrfs_var),
            ("layout.btrfs_home", &layout.btrfs_home),
            ("layout.workspace", &layout.workspace),
        ] {
            if !path.is_absolute() {
                return invalid(format!(
                    "{} must be an absolute path, got {}",
                    key,
                    path.display()
                ));
            }
        }
        if layout.workspace.starts_with(&layout.target) {
            return invalid(format!(
                "layout.workspace ({}) must not live inside layout.target ({})",
                layout.workspace.display(),
                layout.target.display()
            ));
        }
        Ok(())
    }
}
