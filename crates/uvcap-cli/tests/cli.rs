// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Integration tests for the uvcap CLI
//!
//! These tests run the built binary end-to-end using the assert_cmd crate
//! pattern. Most use the simulated device; hardware tests are ignored.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::env;

/// Helper to create a Command for the uvcap binary
/// Uses UVCAP_BIN environment variable if set, otherwise the binary cargo built
fn uvcap_cmd() -> Command {
    match env::var("UVCAP_BIN") {
        Ok(bin_path) => Command::new(bin_path),
        Err(_) => Command::new(env!("CARGO_BIN_EXE_uvcap")),
    }
}

// =============================================================================
// Basic CLI Tests (No Hardware Required)
// =============================================================================

#[test]
fn test_cli_help() {
    uvcap_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("uvcap CLI"))
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_cli_version() {
    uvcap_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("uvcap"));
}

#[test]
fn test_capture_help() {
    uvcap_cmd()
        .args(["capture", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--device"))
        .stdout(predicate::str::contains("--resolution"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--frames"))
        .stdout(predicate::str::contains("--timeout-ms"));
}

#[test]
fn test_missing_subcommand() {
    uvcap_cmd().assert().failure();
}

#[test]
fn test_invalid_resolution() {
    uvcap_cmd()
        .args(["capture", "--simulate", "--resolution", "640by480"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid arguments"));
}

#[test]
fn test_invalid_format() {
    uvcap_cmd()
        .args(["capture", "--simulate", "--format", "MJPEG"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("FOURCC"));
}

#[test]
fn test_zero_buffers() {
    uvcap_cmd()
        .args(["capture", "--simulate", "--buffers", "0"])
        .assert()
        .code(2);
}

#[test]
fn test_too_many_buffers() {
    uvcap_cmd()
        .args(["capture", "--simulate", "--buffers", "4294967295", "-n", "3"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("between 1 and 32"));
}

#[test]
fn test_capture_simulated_max_buffers() {
    uvcap_cmd()
        .args(["--quiet", "capture", "--simulate", "--buffers", "32", "-n", "40"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Frames captured:   40"));
}

#[test]
fn test_capture_missing_device() {
    uvcap_cmd()
        .args(["--quiet", "capture", "--device", "/dev/uvcap-missing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Device unavailable"));
}

#[test]
fn test_info_missing_device() {
    uvcap_cmd()
        .args(["info", "--device", "/dev/uvcap-missing"])
        .assert()
        .code(3);
}

// =============================================================================
// Simulated Device Tests
// =============================================================================

#[test]
fn test_capture_simulated() {
    uvcap_cmd()
        .args(["capture", "--simulate", "--frames", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Frames captured:   12"))
        .stdout(predicate::str::contains("Frame Interval (ms)"));
}

#[test]
fn test_capture_simulated_json() {
    let output = uvcap_cmd()
        .args(["--json", "--quiet", "capture", "--simulate", "-n", "10", "-F", "25"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let metrics: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(metrics["frames"], 10);
    assert_eq!(metrics["dropped_frames"], 0);
    let avg = metrics["interval_avg_ms"].as_f64().unwrap();
    assert!((avg - 40.0).abs() < 0.01, "avg interval {}", avg);
    let fps = metrics["mean_fps"].as_f64().unwrap();
    assert!((fps - 25.0).abs() < 0.01, "mean fps {}", fps);
}

#[test]
fn test_info_simulated_json() {
    let output = uvcap_cmd()
        .args(["--json", "info", "--simulate"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["device"], "sim");
    assert_eq!(info["device_type"], "Camera");
    assert_eq!(info["streaming"], true);
    let formats = info["formats"].as_array().unwrap();
    assert!(formats.iter().any(|f| f["fourcc"] == "MJPG"));
}

#[test]
fn test_info_simulated_text() {
    uvcap_cmd()
        .args(["info", "--simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Supported formats:"))
        .stdout(predicate::str::contains("YUYV"));
}

// =============================================================================
// Hardware Tests
// =============================================================================

#[ignore = "test requires a capture device at /dev/video0 (run with --include-ignored to enable)"]
#[test]
#[serial]
fn test_info_hardware() {
    uvcap_cmd()
        .args(["info", "--device", "/dev/video0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Supported formats:"));
}

#[ignore = "test requires a capture device at /dev/video0 (run with --include-ignored to enable)"]
#[test]
#[serial]
fn test_capture_hardware() {
    uvcap_cmd()
        .args(["--json", "capture", "--device", "/dev/video0", "-n", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"frames\": 30"));
}
