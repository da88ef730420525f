//! Property tests for whole scans.
//!
//! The callback must observe the file contents exactly once, in order, and
//! the orchestrator submits one request per window after the first.

use std::io::Write;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use readahead_rs::{alloc_granularity, scan_file, NoopSink, ScanConfig, ScanMode};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn scan_sees_file_once_in_order(
        data in prop::collection::vec(any::<u8>(), 0..150_000),
        chunk_size in 512usize..70_000,
        direct in any::<bool>(),
    ) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let window = alloc_granularity();
        let config = ScanConfig {
            window_size: window,
            chunk_size: chunk_size.min(window),
            mode: if direct { ScanMode::Direct } else { ScanMode::Prefetch },
            ..ScanConfig::default()
        };

        let mut seen = Vec::with_capacity(data.len());
        let report = scan_file(file.path(), &config, Arc::new(NoopSink), |bytes| {
            seen.extend_from_slice(bytes)
        })
        .unwrap();

        prop_assert_eq!(&seen, &data);
        let windows = data.len().div_ceil(window) as u64;
        prop_assert_eq!(report.windows, windows);
        if direct {
            prop_assert_eq!(report.requests_submitted, 0);
        } else {
            prop_assert_eq!(report.requests_submitted, windows.saturating_sub(1));
            prop_assert_eq!(report.prefetch.read_errors, 0);
        }
    }
}
