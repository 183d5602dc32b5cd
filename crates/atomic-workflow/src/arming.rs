//! Arming token for destructive execution.
//!
//! Every HAL option that carries `confirmed: true` in the pipeline is built from an
//! [`ExecuteArmToken`], so wiping, partitioning, formatting and resizing can only happen once the
//! operator has both passed `--yes-i-know` and confirmed the prompt.

use anyhow::Result;
use atomic_error::InstallError;
use atomic_hal::{FormatOptions, PartedOptions, ResizeOptions, WipeFsOptions};

#[derive(Debug, Clone, Copy)]
pub struct ExecuteArmToken(());

impl ExecuteArmToken {
    pub fn try_new(yes_i_know: bool, operator_confirmed: bool) -> Result<Self> {
        if !yes_i_know {
            return Err(InstallError::MissingYesIKnow.into());
        }
        if !operator_confirmed {
            return Err(InstallError::Aborted.into());
        }
        Ok(Self(()))
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::new(true)
    }

    pub fn wipefs_options(&self) -> WipeFsOptions {
        WipeFsOptions::new(true)
    }

    pub fn parted_options(&self) -> PartedOptions {
        PartedOptions::new(true)
    }

    pub fn resize_options(&self) -> ResizeOptions {
        ResizeOptions::new(true)
    }
}
