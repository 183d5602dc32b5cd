use anyhow::{anyhow, Context};
use atomic_installer::{log_failure, logging};
use std::fs;
use tempfile::tempdir;

#[test]
fn failed_run_reaches_the_debug_log_with_its_stage() {
    let dir = tempdir().expect("temp dir");
    let log_path = dir.path().join("logs/install.log");
    let opened = logging::init_with(&log_path).expect("log file opened");
    assert_eq!(opened, log_path);

    let result: anyhow::Result<()> =
        Err(anyhow!("podman exited with exit code 1")).context("stage Deploy");
    let err = log_failure(result).unwrap_err();
    assert!(format!("{:#}", err).starts_with("stage Deploy"));

    let logged = fs::read_to_string(&log_path).expect("debug log");
    assert!(
        logged.contains("stage Deploy: podman exited with exit code 1"),
        "{}",
        logged
    );
}

#[test]
fn successful_result_passes_through() {
    assert_eq!(log_failure(Ok::<_, anyhow::Error>(7)).expect("ok"), 7);
}
