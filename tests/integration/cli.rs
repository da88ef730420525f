//! Runs the `readahead-rs` binary end to end.

use std::process::Command;

use crate::patterned_file;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_readahead-rs"))
}

#[test]
fn prints_status_and_hash() {
    let file = patterned_file(3 * 1024 * 1024);
    let out = bin()
        .arg("--rounds=1")
        .arg(file.path())
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{stdout}");
    assert!(lines[0].starts_with("STATUS: Found file '"));
    assert!(lines[0].ends_with(", 3145728 bytes."));

    let groups: Vec<&str> = lines[1].split(' ').collect();
    assert_eq!(groups.len(), 4);
    assert!(groups
        .iter()
        .all(|g| g.len() == 8 && g.chars().all(|c| c.is_ascii_hexdigit())));
    assert!(lines[2].starts_with("STATUS: Finished run in "));
}

#[test]
fn modes_print_the_same_hash() {
    let file = patterned_file(5 * 1024 * 1024 + 3);
    let hash_line = |mode: &str| {
        let out = bin()
            .arg(format!("--mode={mode}"))
            .arg("--rounds=2")
            .arg(file.path())
            .output()
            .unwrap();
        assert!(out.status.success());
        String::from_utf8(out.stdout).unwrap().lines().nth(1).unwrap().to_string()
    };
    assert_eq!(hash_line("prefetch"), hash_line("direct"));
}

#[test]
fn bad_arguments_exit_2() {
    assert_eq!(bin().output().unwrap().status.code(), Some(2));
    assert_eq!(
        bin().args(["--mode=turbo", "x"]).output().unwrap().status.code(),
        Some(2)
    );
    assert_eq!(
        bin().args(["--window-size=0", "x"]).output().unwrap().status.code(),
        Some(2)
    );
    assert_eq!(bin().arg("--bogus").output().unwrap().status.code(), Some(2));
}

#[test]
fn oversized_chunk_is_rejected_before_scanning() {
    let file = patterned_file(64 * 1024);
    let out = bin()
        .arg("--chunk-size=1099511627776")
        .arg(file.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("chunk_size"));
    assert!(out.stdout.is_empty());
}

#[test]
fn missing_file_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let status = bin()
        .arg(dir.path().join("missing.bin"))
        .output()
        .unwrap()
        .status;
    assert_eq!(status.code(), Some(1));
}

#[test]
fn trace_flag_writes_markers_to_stderr() {
    let file = patterned_file(4 * 1024 * 1024 + 1);
    let out = bin()
        .args(["--trace", "--rounds=1"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("MAIN-PREFETCH 1"));
    assert!(stderr.contains("PREFETCH-SLEEP"));
    assert!(stderr.contains("mode=prefetch windows=3"));
}
