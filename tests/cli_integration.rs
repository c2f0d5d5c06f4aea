use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_vcdiff-stream").to_string()
}

fn sample() -> (Vec<u8>, Vec<u8>) {
    let dictionary = b"<html><head><title>page</title></head><body>".repeat(20);
    let mut target = dictionary[..400].to_vec();
    target.extend_from_slice(b"<p>changed paragraph</p>");
    target.extend_from_slice(&dictionary[400..]);
    (dictionary, target)
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.vcdiff");
    let output = dir.path().join("output.bin");

    let (dictionary, payload) = sample();
    std::fs::write(&dict, &dictionary).unwrap();
    std::fs::write(&target, &payload).unwrap();

    let st = Command::new(bin())
        .args(["encode", "--checksum", "--interleaved", "--dictionary"])
        .arg(&dict)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());
    assert!(std::fs::metadata(&delta).unwrap().len() < payload.len() as u64);

    let st = Command::new(bin())
        .args(["decode", "--dictionary"])
        .arg(&dict)
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(std::fs::read(&output).unwrap(), payload);
}

#[test]
fn cli_streams_stdin_to_stdout() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let (dictionary, payload) = sample();
    std::fs::write(&dict, &dictionary).unwrap();

    let mut child = Command::new(bin())
        .args(["encode", "--json", "-d"])
        .arg(&dict)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(&payload).unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(json.is_array());

    let mut child = Command::new(bin())
        .args(["decode", "-d"])
        .arg(&dict)
        .args(["-", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(&out.stdout).unwrap();
    let decoded = child.wait_with_output().unwrap();
    assert!(decoded.status.success());
    assert_eq!(decoded.stdout, payload);
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.vcdiff");
    std::fs::write(&dict, b"dictionary").unwrap();
    std::fs::write(&input, b"payload").unwrap();
    std::fs::write(&output, b"existing").unwrap();

    let st = Command::new(bin())
        .args(["encode", "-d"])
        .arg(&dict)
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert_eq!(st.code(), Some(1));
    assert_eq!(std::fs::read(&output).unwrap(), b"existing");

    let st = Command::new(bin())
        .args(["--force", "encode", "-d"])
        .arg(&dict)
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
}

#[test]
fn cli_decode_error_exits_with_one() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let input = dir.path().join("bad.vcdiff");
    std::fs::write(&dict, b"dictionary").unwrap();
    std::fs::write(&input, b"this is not a delta").unwrap();

    let out = Command::new(bin())
        .args(["decode", "-d"])
        .arg(&dict)
        .arg(&input)
        .arg(dir.path().join("out.bin"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("VCD_DECODE_ERROR"), "{stderr}");
    assert!(!dir.path().join("out.bin").exists());
    assert!(!dir.path().join(".out.bin.partial").exists());
}

#[test]
fn cli_failed_decode_keeps_the_existing_output() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let (dictionary, payload) = sample();
    std::fs::write(&dict, &dictionary).unwrap();
    let delta = dir.path().join("delta.vcdiff");
    let target = dir.path().join("target.bin");
    std::fs::write(&target, &payload).unwrap();
    let st = Command::new(bin())
        .args(["encode", "-d"])
        .arg(&dict)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());

    // Cut the delta short so decoding fails at the end of input.
    let bytes = std::fs::read(&delta).unwrap();
    let cut = dir.path().join("cut.vcdiff");
    std::fs::write(&cut, &bytes[..bytes.len() - 1]).unwrap();
    let output = dir.path().join("output.bin");
    std::fs::write(&output, b"previous contents").unwrap();

    let st = Command::new(bin())
        .args(["--force", "decode", "-d"])
        .arg(&dict)
        .arg(&cut)
        .arg(&output)
        .status()
        .unwrap();
    assert_eq!(st.code(), Some(1));
    assert_eq!(std::fs::read(&output).unwrap(), b"previous contents");
    assert!(!dir.path().join(".output.bin.partial").exists());
}

#[test]
fn cli_rejects_invalid_window_size() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    std::fs::write(&dict, b"dictionary").unwrap();

    let out = Command::new(bin())
        .args(["encode", "--min-window", "63", "-d"])
        .arg(&dict)
        .arg(dir.path().join("missing-input"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("VCD_VALIDATION_ERROR"));
}

#[test]
fn cli_stats_are_json() {
    let dir = tempdir().unwrap();
    let dict = dir.path().join("dict.bin");
    let input = dir.path().join("in.bin");
    std::fs::write(&dict, b"dictionary bytes").unwrap();
    std::fs::write(&input, b"dictionary bytes, mostly").unwrap();

    let out = Command::new(bin())
        .args(["--stats", "encode", "-d"])
        .arg(&dict)
        .arg(&input)
        .arg(dir.path().join("out.vcdiff"))
        .output()
        .unwrap();
    assert!(out.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(stats["command"], "encode");
    assert_eq!(stats["input_size"], 24);
}
