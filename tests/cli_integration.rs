// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(label: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "ropforge-it-{label}-{}-{now}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_text(path: &Path, text: &str) {
    fs::write(path, text).expect("write file");
}

fn ropforge(args: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ropforge"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("ROPFORGE_QUIET")
        .env_remove("ROPFORGE_INCLUDE_PATHS")
        .output()
        .expect("run ropforge")
}

const CHAIN: &str = "\
; stage one
.popmacro pop_r0 r0
    .dw 0x08048000, r0
.endpopmacro

.macro call fn
    .dw fn
.endmacro

entry:
    .area 16
    .pop r0=data
    call entry
    .endarea
data:
    .ascii \"/bin/sh\"
    .db 0
";

#[test]
fn builds_chain_and_side_artifacts() {
    let dir = unique_temp_dir("ok");
    let input = dir.join("chain.rop");
    write_text(&input, CHAIN);
    let output = dir.join("build/out/chain.bin");
    let labels = dir.join("build/chain.lbl");

    let result = ropforge(&[
        input.as_path(),
        output.as_path(),
        Path::new("--labels"),
        labels.as_path(),
    ]);
    assert!(
        result.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("20 bytes"), "stdout: {stdout}");

    let bytes = fs::read(&output).expect("chain written");
    let mut expected = vec![0x00, 0x80, 0x04, 0x08, 12, 0, 0, 0, 0, 0, 0, 0];
    expected.extend_from_slice(b"/bin/sh\0");
    assert_eq!(bytes, expected);
    assert_eq!(
        fs::read_to_string(&labels).expect("labels written"),
        "data = $0000000C\nentry = $00000000\n"
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn quiet_run_prints_nothing() {
    let dir = unique_temp_dir("quiet");
    let input = dir.join("chain.rop");
    write_text(&input, ".db 1\n");
    let output = dir.join("chain.bin");

    let result = ropforge(&[Path::new("-q"), input.as_path(), output.as_path()]);
    assert!(result.status.success());
    assert!(result.stdout.is_empty());
    assert_eq!(fs::read(&output).expect("chain written"), vec![1]);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn build_failure_exits_with_one_and_reports_the_line() {
    let dir = unique_temp_dir("fail");
    let input = dir.join("chain.rop");
    write_text(&input, ".area 2\n.dw 0\n.endarea\n");
    let output = dir.join("chain.bin");

    let result = ropforge(&[input.as_path(), output.as_path()]);
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains(":2:"), "stderr: {stderr}");
    assert!(stderr.contains("Area overflowed"), "stderr: {stderr}");
    assert!(!output.exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn json_diagnostics_go_to_the_error_file() {
    let dir = unique_temp_dir("json");
    let input = dir.join("chain.rop");
    write_text(&input, ".dw nowhere\n");
    let output = dir.join("chain.bin");
    let diag = dir.join("diag.jsonl");

    let result = ropforge(&[
        Path::new("--format"),
        Path::new("json"),
        Path::new("-E"),
        diag.as_path(),
        input.as_path(),
        output.as_path(),
    ]);
    assert_eq!(result.status.code(), Some(1));
    let text = fs::read_to_string(&diag).expect("diagnostics written");
    let value: serde_json::Value =
        serde_json::from_str(text.lines().next().expect("one diagnostic")).expect("json");
    assert_eq!(value["code"], "rop002");
    assert_eq!(value["severity"], "error");
    let _ = fs::remove_dir_all(&dir);
}

#[cfg(target_os = "linux")]
#[test]
fn unwritable_error_file_falls_back_to_stderr() {
    let dir = unique_temp_dir("full");
    let input = dir.join("chain.rop");
    write_text(&input, ".dw nowhere\n");
    let output = dir.join("chain.bin");

    let result = ropforge(&[
        Path::new("-E"),
        Path::new("/dev/full"),
        input.as_path(),
        output.as_path(),
    ]);
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("rop002"), "stderr: {stderr}");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn forward_operand_in_origin_is_reported() {
    let dir = unique_temp_dir("forward");
    let input = dir.join("chain.rop");
    write_text(&input, ".db 1\n.org start\n.label start, 0x10\n");
    let output = dir.join("chain.bin");

    let result = ropforge(&[input.as_path(), output.as_path()]);
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("rop008"), "stderr: {stderr}");
    assert!(stderr.contains(":2:"), "stderr: {stderr}");
    assert!(!output.exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let result = Command::new(env!("CARGO_BIN_EXE_ropforge"))
        .arg("only-input.rop")
        .output()
        .expect("run ropforge");
    assert_eq!(result.status.code(), Some(2));
}
