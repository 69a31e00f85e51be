//! CLI end-to-end tests
//!
//! Tests for moovforge command-line interface.

mod common;

use assert_cmd::prelude::*;
use common::write_av_file;
use moovforge_mp4::MuxerConfig;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the moovforge binary
#[allow(deprecated)]
fn moovforge_cmd() -> Command {
    let mut cmd = Command::cargo_bin("moovforge").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = moovforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = moovforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("moovforge"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = moovforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_info_command() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 2000);

    let mut cmd = moovforge_cmd();
    cmd.arg("info")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Brand: isom"))
        .stdout(predicate::str::contains("progressive"))
        .stdout(predicate::str::contains("1280x720"))
        .stdout(predicate::str::contains("g711a"));
}

#[test]
fn test_cli_info_json() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_av_file(&input, MuxerConfig::fragmented(1000), 2000);

    let mut cmd = moovforge_cmd();
    let output = cmd.arg("info").arg(&input).arg("--json").output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["fragmented"], true);
    assert_eq!(json["major_brand"], "iso5");
    assert_eq!(json["tracks"][0]["codec_id"], "h264");
    assert_eq!(json["tracks"][0]["params"]["kind"], "video");
    assert_eq!(json["tracks"][0]["sample_count"], 50);
    assert_eq!(json["tracks"][1]["params"]["sample_rate"], 8000);
}

#[test]
fn test_cli_info_nonexistent_file() {
    let mut cmd = moovforge_cmd();
    cmd.arg("info")
        .arg("/nonexistent/file.mp4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_remux_fragmented() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("output.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 3000);

    let mut cmd = moovforge_cmd();
    cmd.arg("remux")
        .arg(&input)
        .arg(&output)
        .arg("--fragmented")
        .arg("--fragment-duration")
        .arg("1000")
        .arg("--align-keyframes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 225 packets"));

    let data = fs::read(&output).unwrap();
    assert_eq!(&data[4..8], b"ftyp");
    assert_eq!(&data[8..12], b"iso5");
}

#[test]
fn test_cli_remux_rejects_zero_fragment_duration() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 1000);

    let mut cmd = moovforge_cmd();
    cmd.arg("remux")
        .arg(&input)
        .arg(dir.path().join("output.mp4"))
        .arg("--fragment-duration")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be 0"));
}

#[test]
fn test_cli_segment_command() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let out_dir = dir.path().join("out");
    write_av_file(&input, MuxerConfig::progressive(), 3000);

    let mut cmd = moovforge_cmd();
    cmd.arg("segment")
        .arg(&input)
        .arg(&out_dir)
        .arg("--fragment-duration")
        .arg("1000")
        .assert()
        .success()
        .stdout(predicate::str::contains("init.mp4"))
        .stdout(predicate::str::contains("segment-1.m4s"));

    assert!(out_dir.join("init.mp4").exists());
    assert!(out_dir.join("segment-2.m4s").exists());
}

#[test]
fn test_cli_validate_command() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("moovforge.toml");
    fs::write(
        &config_path,
        r#"
[muxer]
mode = "fragmented"
timescale = 90000

[muxer.fragment]
duration = 180000
"#,
    )
    .unwrap();

    let mut cmd = moovforge_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Timescale: 90000"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "[muxer]\ntimescale = 0\n").unwrap();

    let mut cmd = moovforge_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("timescale"));
}

#[test]
fn test_cli_global_config_flag() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("moovforge.toml");
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("output.mp4");
    fs::write(&config_path, "[muxer]\nmode = \"fragmented\"\n").unwrap();
    write_av_file(&input, MuxerConfig::progressive(), 1000);

    let mut cmd = moovforge_cmd();
    cmd.arg("-c")
        .arg(&config_path)
        .arg("remux")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let data = fs::read(&output).unwrap();
    assert_eq!(&data[8..12], b"iso5");
}
