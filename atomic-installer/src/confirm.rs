//! Operator confirmation before the disk is destroyed.

use anyhow::{Context, Result};
use atomic_workflow::ExecuteArmToken;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Ask `Destroy all data on <disk>? (y/N)` until a recognised answer arrives.
///
/// `y`/`yes` accepts; blank, `n`/`no` and end of input decline. Anything else re-prompts.
pub fn prompt_destroy<R: BufRead, W: Write>(disk: &Path, input: &mut R, output: &mut W) -> Result<bool> {
    loop {
        write!(output, "Destroy all data on {}? (y/N) ", disk.display())?;
        output.flush()?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read confirmation input")?;
        if read == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            other => writeln!(output, "Please answer 'y' or 'n' (got '{}').", other)?,
        }
    }
}

pub fn confirm_destroy(disk: &Path) -> Result<bool> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    prompt_destroy(disk, &mut input, &mut output)
}

/// Produce the arming token for a destructive run.
///
/// `--yes-i-know` skips the prompt. Without it the operator must answer the prompt, which
/// requires an interactive stdin.
pub fn arm_with<C>(yes_i_know: bool, interactive: bool, confirm: C) -> Result<ExecuteArmToken>
where
    C: FnOnce() -> Result<bool>,
{
    if yes_i_know {
        return ExecuteArmToken::try_new(true, true);
    }
    if !interactive {
        return ExecuteArmToken::try_new(false, false);
    }
    let confirmed = confirm()?;
    ExecuteArmToken::try_new(true, confirmed)
}
