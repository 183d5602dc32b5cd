//! Tree copies via rsync.

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct RsyncOptions {
    /// `-a` plus hardlinks, ACLs and xattrs (`-aHAX`).
    pub archive: bool,
    /// `-v`, one line per transferred file.
    pub verbose: bool,
    /// Extra rsync args (verbatim).
    pub extra_args: Vec<String>,
}

impl RsyncOptions {
    /// `-aHAXv`: keeps permissions, ownership, ACLs and extended attributes.
    pub fn preserve_all() -> Self {
        Self {
            archive: true,
            verbose: true,
            extra_args: Vec::new(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut flags = String::new();
        if self.archive {
            flags.push_str("aHAX");
        }
        if self.verbose {
            flags.push('v');
        }
        let mut args = Vec::new();
        if !flags.is_empty() {
            args.push(format!("-{}", flags));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

pub trait RsyncOps {
    /// Copy the contents of `src` into `dst` (`rsync <opts> <src>/ <dst>`), streaming stdout
    /// line-by-line into `on_stdout_line`.
    ///
    /// If `on_stdout_line` returns false the copy is aborted and an error is returned.
    fn rsync_stream_stdout(
        &self,
        src: &Path,
        dst: &Path,
        opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserve_all_renders_combined_flag() {
        assert_eq!(RsyncOptions::preserve_all().args(), vec!["-aHAXv"]);
        assert!(RsyncOptions::default().args().is_empty());
    }
}
