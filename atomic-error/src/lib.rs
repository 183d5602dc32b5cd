use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type InstallResult<T> = Result<T, InstallError>;

/// Failures raised by world-touching operations (external commands, syscalls).
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Safety lock engaged. Destructive operations require an explicit confirmation.")]
    SafetyLock,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl HalError {
    /// Exit code of the failed command, if the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HalError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Precondition and data errors raised by the provisioning pipeline itself.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("Target disk {0} does not exist")]
    DiskNotFound(PathBuf),

    #[error("Target {0} is not a block device")]
    NotBlockDevice(PathBuf),

    #[error("Target disk {disk} has mounted filesystems: {mounts}")]
    DiskInUse { disk: PathBuf, mounts: String },

    #[error("Partition map is missing the {0} partition")]
    MissingRole(&'static str),

    #[error("Expected {expected} partitions on {disk}, found {found}")]
    PartitionCountMismatch {
        disk: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error(
        "Temp partition is already gone from {disk} ({found} partitions left); \
         refusing to resize or delete anything else"
    )]
    TempPartitionMissing { disk: PathBuf, found: usize },

    #[error("Partition {expected} is not the last partition on the disk (found {found})")]
    UnexpectedPartition { expected: PathBuf, found: PathBuf },

    #[error("blkid returned an empty UUID for {0}")]
    EmptyUuid(PathBuf),

    #[error("UUID of {device} changed from {before} to {after}")]
    UuidChanged {
        device: PathBuf,
        before: String,
        after: String,
    },

    #[error("No ostree deployment found under {0}")]
    DeploymentNotFound(PathBuf),

    #[error("Multiple ostree deployments found under {root}: {candidates}")]
    AmbiguousDeployment { root: PathBuf, candidates: String },

    #[error("Mount plan lists {child} before its parent {parent}")]
    MountOrder { child: PathBuf, parent: PathBuf },

    #[error("Missing --yes-i-know flag. This operation is destructive!")]
    MissingYesIKnow,

    #[error("Operation aborted by user")]
    Aborted,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
