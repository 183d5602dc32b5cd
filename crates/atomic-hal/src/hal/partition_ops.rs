//! Partitioning operations (wipefs/parted).

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WipeFsOptions {
    pub confirmed: bool,
}

impl WipeFsOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}

#[derive(Debug, Clone)]
pub struct PartedOptions {
    pub confirmed: bool,
}

impl PartedOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}

/// A single partition-table edit executed via `parted -s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    MkLabel {
        label: String,
    },
    MkPart {
        part_type: String,
        fs_type: Option<String>,
        start: String,
        end: String,
    },
    SetFlag {
        part_num: u32,
        flag: String,
        state: String,
    },
    Name {
        part_num: u32,
        label: String,
    },
    Rm {
        part_num: u32,
    },
    ResizePart {
        part_num: u32,
        end: String,
    },
}

impl PartedOp {
    /// Command words following `parted -s <disk>`.
    pub fn args(&self) -> Vec<String> {
        match self {
            PartedOp::MkLabel { label } => vec!["mklabel".to_string(), label.clone()],
            PartedOp::MkPart {
                part_type,
                fs_type,
                start,
                end,
            } => {
                let mut args = vec!["mkpart".to_string(), part_type.clone()];
                if let Some(fs) = fs_type {
                    args.push(fs.clone());
                }
                args.push(start.clone());
                args.push(end.clone());
                args
            }
            PartedOp::SetFlag {
                part_num,
                flag,
                state,
            } => vec![
                "set".to_string(),
                part_num.to_string(),
                flag.clone(),
                state.clone(),
            ],
            PartedOp::Name { part_num, label } => {
                vec!["name".to_string(), part_num.to_string(), label.clone()]
            }
            PartedOp::Rm { part_num } => vec!["rm".to_string(), part_num.to_string()],
            PartedOp::ResizePart { part_num, end } => {
                vec!["resizepart".to_string(), part_num.to_string(), end.clone()]
            }
        }
    }

    /// Negative offsets (`-20480MiB`) would otherwise be parsed as parted options.
    pub fn needs_option_terminator(&self) -> bool {
        self.args().iter().skip(1).any(|a| a.starts_with('-'))
    }
}

pub trait PartitionOps {
    /// `wipefs --all <disk>`
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()>;

    /// Execute a single `parted` operation on the given disk, returning its stdout.
    fn parted(&self, disk: &Path, op: PartedOp, opts: &PartedOptions) -> HalResult<String>;
}
