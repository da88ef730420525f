//! Whole-file scans through `scan_file`.

use std::sync::Arc;

use readahead_rs::{
    scan_file, NoopSink, RecordingSink, ScanConfig, ScanMode, TraceLane, WindowHash,
};

use crate::patterned_file;

const MIB: usize = 1024 * 1024;

#[test]
fn five_mib_file_in_two_mib_windows() {
    let file = patterned_file(5 * MIB);
    let sink = Arc::new(RecordingSink::new());
    let config = ScanConfig {
        window_size: 2 * MIB,
        ..ScanConfig::default()
    };

    let mut windows = Vec::new();
    let report = scan_file(file.path(), &config, sink.clone(), |bytes| {
        windows.push(bytes.len())
    })
    .unwrap();

    assert_eq!(windows, vec![2 * MIB, 2 * MIB, MIB]);
    assert_eq!(report.file_size, 5 * MIB as u64);
    assert_eq!(report.bytes_scanned, 5 * MIB as u64);
    assert_eq!(report.requests_submitted, 2);
    assert_eq!(report.requests_rejected, 0);
    assert_eq!(report.cancels_submitted, 2);
    assert_eq!(report.prefetch.requests_started, 2);
    assert_eq!(report.prefetch.read_errors, 0);

    // The request for window 2 covers only the 1 MiB tail.
    assert!(report.prefetch.bytes_warmed <= 3 * MIB as u64);
    assert_eq!(sink.count_prefix(TraceLane::Main, "MAIN-PREFETCH"), 2);
    assert_eq!(sink.count_prefix(TraceLane::Main, "MAIN-PROCESS"), 3);
    assert_eq!(sink.count_prefix(TraceLane::Task, "PREFETCH-START"), 2);
}

#[test]
fn callback_sees_every_byte_in_order() {
    let len = 3 * MIB + 12_345;
    let file = patterned_file(len);
    let expected = std::fs::read(file.path()).unwrap();
    let config = ScanConfig {
        window_size: MIB,
        chunk_size: 64 * 1024,
        ..ScanConfig::default()
    };

    let mut seen = Vec::with_capacity(len);
    scan_file(file.path(), &config, Arc::new(NoopSink), |bytes| {
        seen.extend_from_slice(bytes)
    })
    .unwrap();
    assert_eq!(seen, expected);
}

#[test]
fn prefetch_and_direct_modes_hash_identically() {
    let file = patterned_file(2 * MIB + 777);
    let hash_with = |mode| {
        let config = ScanConfig {
            window_size: MIB,
            mode,
            ..ScanConfig::default()
        };
        let mut hash = WindowHash::new(0);
        let report = scan_file(file.path(), &config, Arc::new(NoopSink), |bytes| {
            hash.update(bytes)
        })
        .unwrap();
        hash.finish(report.file_size)
    };

    assert_eq!(hash_with(ScanMode::Prefetch), hash_with(ScanMode::Direct));
}

#[test]
fn zero_byte_file_has_no_windows() {
    let file = patterned_file(0);
    let sink = Arc::new(RecordingSink::new());
    let mut calls = 0;
    let report = scan_file(file.path(), &ScanConfig::default(), sink.clone(), |_| {
        calls += 1
    })
    .unwrap();

    assert_eq!(calls, 0);
    assert_eq!(report.windows, 0);
    assert_eq!(report.requests_submitted, 0);
    assert!(sink.events().is_empty());
}

#[test]
fn single_window_file_submits_nothing() {
    let file = patterned_file(1000);
    let report = scan_file(
        file.path(),
        &ScanConfig::default(),
        Arc::new(NoopSink),
        |_| {},
    )
    .unwrap();
    assert_eq!(report.windows, 1);
    assert_eq!(report.requests_submitted, 0);
    assert_eq!(report.cancels_submitted, 0);
    assert_eq!(report.prefetch.requests_started, 0);
}

#[test]
fn missing_file_is_an_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = scan_file(
        &dir.path().join("nope.bin"),
        &ScanConfig::default(),
        Arc::new(NoopSink),
        |_| {},
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("unable to open file"));
}
