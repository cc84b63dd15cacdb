//! CLI subprocess integration tests.
//!
//! These tests invoke the `marquee` binary against the in-memory mock engine
//! and verify exit codes, stdout content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::Command;

fn marquee_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_marquee"));
    cmd.env_remove("MARQUEE_CONFIG").env_remove("MARQUEE_LOG");
    cmd
}

fn write_mock_config(dir: &Path) -> PathBuf {
    let path = dir.join("marquee.toml");
    std::fs::write(
        &path,
        format!(
            r#"[engine]
kind = "mock"

[paths]
library_root = '{}'
install_root = '{}'
"#,
            dir.join("library").display(),
            dir.join("installs").display()
        ),
    )
    .unwrap();
    path
}

fn write_native_request(dir: &Path, launch_command: &str) -> PathBuf {
    let path = dir.join("request.toml");
    std::fs::write(
        &path,
        format!(
            r#"session_id = "s1"

[game]
slug = "alpha"
title = "Alpha"
location = "alpha"
launch_command = "{launch_command}"
args = ["--fullscreen"]

[platform]
variant = "native"
image = "marquee-native:latest"
"#
        ),
    )
    .unwrap();
    path
}

fn run_with_config(dir: &Path, args: &[&str]) -> std::process::Output {
    let config = write_mock_config(dir);
    marquee_bin()
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn cli_version_exits_zero() {
    let output = marquee_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "marquee --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("marquee"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = marquee_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["launch", "stop", "logs", "doctor", "setup-prefix", "convert-reg"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_dry_run_prints_spec_without_starting() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_native_request(dir.path(), "bin/alpha");
    let output = run_with_config(
        dir.path(),
        &["--json", "launch", "--dry-run", &request.to_string_lossy()],
    );
    assert!(
        output.status.success(),
        "dry run must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let spec: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(spec["name"], "marquee-s1");
    assert_eq!(spec["image"], "marquee-native:latest");
    let env = spec["env"].as_array().unwrap();
    assert!(env
        .iter()
        .any(|pair| pair[0] == "GAME_ARGS" && pair[1] == "--fullscreen"));
}

#[test]
fn cli_launch_with_mock_engine() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_native_request(dir.path(), "bin/alpha");
    let output = run_with_config(dir.path(), &["--json", "launch", &request.to_string_lossy()]);
    assert!(
        output.status.success(),
        "launch must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["session"]["session_id"], "s1");
    assert_eq!(value["session"]["state"], "running");
    assert_eq!(value["container"]["name"], "marquee-s1");
    assert!(value["exec_hint"].is_null());
}

#[test]
fn cli_debug_launch_prints_exec_hint() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_native_request(dir.path(), "bin/alpha");
    let output = run_with_config(
        dir.path(),
        &["--json", "launch", "--debug", &request.to_string_lossy()],
    );
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hint = value["exec_hint"].as_str().unwrap();
    assert!(hint.starts_with("docker exec -it "), "hint: {hint}");
}

#[test]
fn cli_invalid_request_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_native_request(dir.path(), "");
    let output = run_with_config(dir.path(), &["launch", &request.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("launch_command"), "stderr: {stderr}");
}

#[test]
fn cli_invalid_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[engine]\nkind = \"mock\"\nbogus = 1\n").unwrap();
    let output = marquee_bin()
        .arg("--config")
        .arg(&config)
        .arg("sessions")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config error"), "stderr: {stderr}");
}

#[test]
fn cli_stop_unknown_session_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_config(dir.path(), &["stop", "never-started"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("stopped session never-started"));
}

#[test]
fn cli_status_unknown_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_config(dir.path(), &["status", "nope"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no such session: nope"));
}

#[test]
fn cli_sessions_empty() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_config(dir.path(), &["sessions"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no sessions found"));
}

#[test]
fn cli_doctor_json_with_mock() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_config(dir.path(), &["--json", "doctor"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["healthy"], true);
    let checks = value["checks"].as_array().unwrap();
    assert!(checks
        .iter()
        .any(|c| c["name"] == "engine" && c["status"] == "pass"));
}

#[test]
fn cli_convert_reg_to_stdout_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("setup.cmd");
    std::fs::write(
        &script,
        "SET regpath=\"HKCU\\\\Software\\\\X\"\r\nREG ADD %regpath% /v \"Val\" /t REG_DWORD /d 10 /f\r\n",
    )
    .unwrap();

    let output = marquee_bin()
        .args(["convert-reg", &script.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Windows Registry Editor Version 5.00\n\n[HKCU\\Software\\X]\n\"Val\"=dword:0000000a\n"
    );

    let target = dir.path().join("out.reg");
    let output = marquee_bin()
        .args([
            "convert-reg",
            &script.to_string_lossy(),
            "--output",
            &target.to_string_lossy(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(std::fs::read_to_string(&target)
        .unwrap()
        .contains("\"Val\"=dword:0000000a"));
}

#[test]
fn cli_shortcut_rejects_non_link() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("game.lnk");
    std::fs::write(&file, b"definitely not a shell link").unwrap();
    let output = marquee_bin()
        .args(["shortcut", &file.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a valid shell link"));
}

#[test]
fn cli_shortcut_empty_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let output = marquee_bin()
        .args(["--json", "shortcut", &dir.path().to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value, serde_json::json!([]));
}

#[test]
fn cli_completions_bash() {
    let output = marquee_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("marquee"));
}
