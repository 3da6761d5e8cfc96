//! Usage errors that abort the process.
//!
//! Each test re-runs this test binary as a child with `SPOOL_FATAL_CASE` set,
//! so the child performs the misuse and the parent checks how it died.

use std::env;
use std::process::{Command, Output};
use std::time::Duration;

use spool::log::{LogConfig, LogPipeline, log_write};

const CASE_VAR: &str = "SPOOL_FATAL_CASE";

/// Runs `test_name` alone in a child process with the misuse enabled.
fn run_child(test_name: &str) -> Output {
    Command::new(env::current_exe().unwrap())
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CASE_VAR, test_name)
        .output()
        .unwrap()
}

fn in_child(test_name: &str) -> bool {
    env::var(CASE_VAR).is_ok_and(|case| case == test_name)
}

fn assert_aborted(output: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "child exited cleanly: {stderr}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(6), "expected SIGABRT: {stderr}");
    }
    assert!(stderr.contains("spool: fatal:"), "stderr: {stderr}");
    assert!(stderr.contains(message), "stderr: {stderr}");
}

#[test]
fn write_larger_than_thread_buffer_aborts() {
    const NAME: &str = "write_larger_than_thread_buffer_aborts";
    if in_child(NAME) {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::new(dir.path().join("big.log"))
            .with_flush_interval(Duration::from_secs(3600))
            .with_buffer_capacity_log2(4);
        let pipeline = LogPipeline::start(config).unwrap();
        pipeline.write(&[b'x'; 17]);
        return;
    }

    let output = run_child(NAME);
    assert_aborted(&output, "exceeds the 16 byte thread buffer");
}

#[test]
fn write_that_fills_thread_buffer_exactly_is_fine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exact.log");
    let config = LogConfig::new(&path).with_buffer_capacity_log2(4);
    let pipeline = LogPipeline::start(config).unwrap();
    pipeline.write(&[b'y'; 16]);
    pipeline.shutdown();
    assert_eq!(std::fs::read(&path).unwrap(), [b'y'; 16]);
}

#[test]
fn global_write_before_init_aborts() {
    const NAME: &str = "global_write_before_init_aborts";
    if in_child(NAME) {
        log_write(b"too early\n");
        return;
    }

    let output = run_child(NAME);
    assert_aborted(&output, "logging used before log_init");
}
