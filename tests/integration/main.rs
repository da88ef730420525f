//! Integration tests for the read-ahead scan engine.
//!
//! Run with: `cargo test --test integration`

mod cli;
mod scan_end_to_end;
mod worker_lifecycle;

use std::io::Write;

use tempfile::NamedTempFile;

/// Writes `len` bytes of a deterministic pattern to a fresh temp file.
pub(crate) fn patterned_file(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let mut buf = Vec::with_capacity(64 * 1024);
    let mut written = 0usize;
    while written < len {
        buf.clear();
        let n = (len - written).min(64 * 1024);
        buf.extend((written..written + n).map(|i| ((i as u64).wrapping_mul(2_654_435_761) >> 13) as u8));
        file.write_all(&buf).unwrap();
        written += n;
    }
    file.flush().unwrap();
    file
}
