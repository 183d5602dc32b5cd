//! Linux HAL implementation backed by the standard userspace tools.

use super::{
    BtrfsOps, ContainerOps, ContainerRun, FormatOps, FormatOptions, HostInfoOps, MountOps,
    MountOptions, PartedOp, PartedOptions, PartitionOps, ProbeOps, ResizeOps, ResizeOptions,
    RsyncOps, RsyncOptions, SystemOps, WipeFsOptions,
};
use crate::{HalError, HalResult};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);
const SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const FORMAT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const WIPEFS_TIMEOUT: Duration = Duration::from_secs(60);
const PARTED_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const BTRFS_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const RESIZE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const RSYNC_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const RSYNC_MAX_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);
const CONTAINER_MAX_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);
const EXIT_GRACE: Duration = Duration::from_secs(30);
const STDERR_TAIL_LINES: usize = 20;

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";
const EFIVARS_PATH: &str = "/sys/firmware/efi/efivars";

fn map_command_err(program: &str, err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    log::debug!("exec: {:?}", cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Drain pipes concurrently so a chatty child never blocks on a full pipe.
    let stdout_handle = std::thread::spawn(move || read_all(stdout));
    let stderr_handle = std::thread::spawn(move || read_all(stderr));

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    Ok(Output {
        status,
        stdout: stdout_handle.join().unwrap_or_default(),
        stderr: stderr_handle.join().unwrap_or_default(),
    })
}

fn read_all<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn status_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<()> {
    let output = output_with_timeout(program, cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(())
}

fn stdout_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<String> {
    let output = output_with_timeout(program, cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

struct StreamLimits {
    /// Abort when no stdout line arrives for this long.
    idle: Option<Duration>,
    max: Duration,
}

/// Run `cmd` to completion, handing each stdout line to `on_line` as it arrives.
fn stream_with_timeout(
    program: &str,
    cmd: &mut Command,
    limits: StreamLimits,
    on_line: &mut dyn FnMut(&str) -> bool,
) -> HalResult<()> {
    log::debug!("exec (streaming): {:?}", cmd);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| map_command_err(program, e))?;

    let mut stderr_handle = child.stderr.take().map(|stderr| {
        let program = program.to_string();
        std::thread::spawn(move || {
            collect_lines(BufReader::new(stderr), |line| {
                log::info!("[{}] {}", program, line)
            })
        })
    });

    let (tx, rx) = mpsc::channel::<io::Result<String>>();
    if let Some(stdout) = child.stdout.take() {
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    let start = Instant::now();
    let mut last_output = Instant::now();
    loop {
        if start.elapsed() > limits.max {
            abort_child(&mut child, &mut stderr_handle);
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: limits.max.as_secs(),
            });
        }
        if let Some(idle) = limits.idle {
            if last_output.elapsed() > idle {
                abort_child(&mut child, &mut stderr_handle);
                return Err(HalError::CommandTimeout {
                    program: program.to_string(),
                    timeout_secs: idle.as_secs(),
                });
            }
        }

        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(line)) => {
                last_output = Instant::now();
                if !on_line(&line) {
                    abort_child(&mut child, &mut stderr_handle);
                    return Err(HalError::Other(format!("{} cancelled", program)));
                }
            }
            Ok(Err(err)) => {
                abort_child(&mut child, &mut stderr_handle);
                return Err(HalError::Io(err));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Children that leak stdout to a grandchild never disconnect; poll for exit too.
                if let Some(status) = child.try_wait()? {
                    for line in rx.try_iter().flatten() {
                        on_line(&line);
                    }
                    return finish_stream(program, status, &mut stderr_handle);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = match child.wait_timeout(EXIT_GRACE).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            abort_child(&mut child, &mut stderr_handle);
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: EXIT_GRACE.as_secs(),
            });
        }
    };
    finish_stream(program, status, &mut stderr_handle)
}

/// Hand each line of `reader` to `on_line` and return everything read.
fn collect_lines<R: BufRead>(mut reader: R, mut on_line: impl FnMut(&str)) -> String {
    let mut all = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                on_line(line);
                all.push_str(line);
                all.push('\n');
            }
        }
    }
    all
}

fn abort_child(child: &mut Child, stderr_handle: &mut Option<JoinHandle<String>>) {
    let _ = child.kill();
    let _ = child.wait();
    if let Some(h) = stderr_handle.take() {
        let _ = h.join();
    }
}

fn finish_stream(
    program: &str,
    status: ExitStatus,
    stderr_handle: &mut Option<JoinHandle<String>>,
) -> HalResult<()> {
    let stderr = stderr_handle
        .take()
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    if !status.success() {
        return Err(HalError::CommandFailed {
            program: program.to_string(),
            code: status.code(),
            stderr: stderr_tail(&stderr),
        });
    }
    Ok(())
}

impl MountOps for LinuxHal {
    fn mount(&self, source: &Path, target: &Path, options: &MountOptions) -> HalResult<()> {
        let mut cmd = Command::new("mount");
        if let Some(opts) = options.as_str() {
            cmd.args(["-o", opts]);
        }
        cmd.arg(source).arg(target);
        status_with_timeout("mount", &mut cmd, MOUNT_TIMEOUT)
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        let mut cmd = Command::new("umount");
        cmd.arg(target);
        status_with_timeout("umount", &mut cmd, MOUNT_TIMEOUT)
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let mut cmd = Command::new("mountpoint");
        cmd.arg("-q").arg(path);
        let output = output_with_timeout("mountpoint", &mut cmd, PROBE_TIMEOUT)?;
        // util-linux exits 32 for "not a mountpoint"; busybox uses 1.
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) | Some(32) => Ok(false),
            _ => Err(output_failed("mountpoint", &output)),
        }
    }
}

impl FormatOps for LinuxHal {
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("mkfs.ext4");
        cmd.arg(device);
        status_with_timeout("mkfs.ext4", &mut cmd, FORMAT_TIMEOUT)
    }

    fn format_btrfs(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("mkfs.btrfs");
        cmd.arg("-f").arg(device);
        status_with_timeout("mkfs.btrfs", &mut cmd, FORMAT_TIMEOUT)
    }

    fn format_vfat(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("mkfs.vfat");
        cmd.arg("-F32").arg(device);
        status_with_timeout("mkfs.vfat", &mut cmd, FORMAT_TIMEOUT)
    }
}

impl SystemOps for LinuxHal {
    fn sync(&self) -> HalResult<()> {
        let mut cmd = Command::new("sync");
        status_with_timeout("sync", &mut cmd, SYNC_TIMEOUT)
    }

    fn udev_settle(&self) -> HalResult<()> {
        let mut cmd = Command::new("udevadm");
        cmd.arg("settle");
        status_with_timeout("udevadm", &mut cmd, SYNC_TIMEOUT)
    }
}

impl HostInfoOps for LinuxHal {
    fn proc_mountinfo(&self) -> HalResult<String> {
        Ok(fs::read_to_string(MOUNTINFO_PATH)?)
    }

    fn is_effective_root(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn uefi_firmware_present(&self) -> bool {
        Path::new(EFIVARS_PATH).exists()
    }
}

impl ProbeOps for LinuxHal {
    fn is_block_device(&self, path: &Path) -> HalResult<bool> {
        match fs::metadata(path) {
            Ok(md) => Ok(md.file_type().is_block_device()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HalError::Io(err)),
        }
    }

    fn lsblk_partitions(&self, disk: &Path) -> HalResult<Vec<PathBuf>> {
        let mut cmd = Command::new("lsblk");
        cmd.args(["-ln", "-o", "NAME,TYPE"]).arg(disk);
        let stdout = stdout_with_timeout("lsblk", &mut cmd, PROBE_TIMEOUT)?;
        Ok(super::parse_lsblk_partitions(&stdout))
    }

    fn lsblk_table(&self, disk: &Path) -> HalResult<String> {
        let mut cmd = Command::new("lsblk");
        cmd.args(["-o", "NAME,SIZE,TYPE,FSTYPE,MOUNTPOINTS,MODEL"])
            .arg(disk);
        stdout_with_timeout("lsblk", &mut cmd, PROBE_TIMEOUT)
    }

    fn blkid_uuid(&self, device: &Path) -> HalResult<String> {
        let mut cmd = Command::new("blkid");
        cmd.args(["-s", "UUID", "-o", "value"]).arg(device);
        Ok(stdout_with_timeout("blkid", &mut cmd, PROBE_TIMEOUT)?
            .trim()
            .to_string())
    }
}

impl PartitionOps for LinuxHal {
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("wipefs");
        cmd.arg("--all").arg(disk);
        status_with_timeout("wipefs", &mut cmd, WIPEFS_TIMEOUT)
    }

    fn parted(&self, disk: &Path, op: PartedOp, opts: &PartedOptions) -> HalResult<String> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("parted");
        cmd.arg("-s");
        if op.needs_option_terminator() {
            cmd.arg("--");
        }
        cmd.arg(disk).args(op.args());
        stdout_with_timeout("parted", &mut cmd, PARTED_TIMEOUT)
    }
}

impl BtrfsOps for LinuxHal {
    fn btrfs_subvolume_list(&self, mount_point: &Path) -> HalResult<String> {
        let mut cmd = Command::new("btrfs");
        cmd.args(["subvolume", "list"]).arg(mount_point);
        stdout_with_timeout("btrfs", &mut cmd, BTRFS_TIMEOUT)
    }

    fn btrfs_subvolume_create(&self, path: &Path) -> HalResult<()> {
        let mut cmd = Command::new("btrfs");
        cmd.args(["subvolume", "create"]).arg(path);
        status_with_timeout("btrfs", &mut cmd, BTRFS_TIMEOUT)
    }

    fn btrfs_resize_max(&self, mount_point: &Path) -> HalResult<()> {
        let mut cmd = Command::new("btrfs");
        cmd.args(["filesystem", "resize", "max"]).arg(mount_point);
        status_with_timeout("btrfs", &mut cmd, BTRFS_TIMEOUT)
    }
}

impl ResizeOps for LinuxHal {
    fn e2fsck_force(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("e2fsck");
        cmd.args(["-f", "-y"]).arg(device);
        let output = output_with_timeout("e2fsck", &mut cmd, RESIZE_TIMEOUT)?;
        match output.status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => Err(output_failed("e2fsck", &output)),
        }
    }

    fn resize2fs(&self, device: &Path, opts: &ResizeOptions) -> HalResult<()> {
        if !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        let mut cmd = Command::new("resize2fs");
        cmd.arg(device);
        status_with_timeout("resize2fs", &mut cmd, RESIZE_TIMEOUT)
    }
}

impl RsyncOps for LinuxHal {
    fn rsync_stream_stdout(
        &self,
        src: &Path,
        dst: &Path,
        opts: &RsyncOptions,
        on_stdout_line: &mut dyn FnMut(&str) -> bool,
    ) -> HalResult<()> {
        let mut cmd = Command::new("rsync");
        // Trailing slash copies the contents of `src`, not the directory itself.
        cmd.args(opts.args())
            .arg(format!("{}/", src.display()))
            .arg(dst);

        let limits = StreamLimits {
            idle: opts.verbose.then_some(RSYNC_IDLE_TIMEOUT),
            max: RSYNC_MAX_TIMEOUT,
        };
        stream_with_timeout("rsync", &mut cmd, limits, on_stdout_line)
    }
}

impl ContainerOps for LinuxHal {
    fn container_run(
        &self,
        run: &ContainerRun,
        on_output_line: &mut dyn FnMut(&str),
    ) -> HalResult<()> {
        let mut cmd = Command::new(&run.engine);
        cmd.args(run.argv());

        // Image pulls can be silent for a long time; only the hard cap applies.
        let limits = StreamLimits {
            idle: None,
            max: CONTAINER_MAX_TIMEOUT,
        };
        stream_with_timeout(&run.engine, &mut cmd, limits, &mut |line: &str| {
            on_output_line(line);
            true
        })
    }
}
