//! Property tests for window tiling.
//!
//! For any file size and any granularity-aligned window size, the windows
//! handed out by `WindowManager` cover `[0, size)` exactly, in order, and
//! only the last one may be short.

use std::io::Write;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use readahead_rs::{alloc_granularity, Advance, WindowManager};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn windows_tile_file(size in 0usize..200_000, multiple in 1usize..4) {
        let window = alloc_granularity() * multiple;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0x5A; size]).unwrap();
        file.flush().unwrap();

        let mut wm = WindowManager::open(file.path(), window).unwrap();
        let mut spans = Vec::new();
        while let Some(cur) = wm.current() {
            spans.push((cur.offset, cur.len()));
            if wm.advance().unwrap() == Advance::EndOfFile {
                break;
            }
        }

        let mut next = 0u64;
        for (i, &(offset, len)) in spans.iter().enumerate() {
            prop_assert_eq!(offset, next);
            prop_assert!(len > 0);
            if i + 1 < spans.len() {
                prop_assert_eq!(len, window);
            } else {
                prop_assert!(len <= window);
            }
            next += len as u64;
        }
        prop_assert_eq!(next, size as u64);
        prop_assert_eq!(spans.len(), size.div_ceil(window));
        prop_assert!(wm.is_eof());
        prop_assert_eq!(wm.advance().unwrap(), Advance::EndOfFile);
    }
}
