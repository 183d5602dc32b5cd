//! Logger setup: console plus a persistent debug log.

use env_logger::Target;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const FALLBACK_LOG_NAME: &str = "atomic-installer-debug.log";

/// Copies every record to stderr and to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Console output is best effort.
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Open the first writable log file among `preferred` and `fallback`.
pub fn open_log_file(preferred: &Path, fallback: &Path) -> Option<(PathBuf, File)> {
    [preferred, fallback]
        .into_iter()
        .find_map(|path| open_append(path).ok().map(|file| (path.to_path_buf(), file)))
}

/// Initialise the global logger. Returns the debug log path, if one could be opened.
///
/// Level defaults to `info`; `RUST_LOG` overrides it.
pub fn init_with(log_file: &Path) -> Option<PathBuf> {
    let fallback = env::temp_dir().join(FALLBACK_LOG_NAME);
    let (target, path) = match open_log_file(log_file, &fallback) {
        Some((path, file)) => (Target::Pipe(Box::new(TeeWriter { file })), Some(path)),
        None => (Target::Stderr, None),
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target);
    if builder.try_init().is_err() {
        return None;
    }
    path
}
