//! Scan orchestrator: walks a file window by window on the calling thread.
//!
//! # Prefetch mode
//!
//! For window `k` (offset `o`, length `n`):
//!
//! 1. pre-fault the whole window,
//! 2. cancel request `k` (the one that was warming this window) if it is
//!    still outstanding,
//! 3. submit request `k + 1` for `[o + n, o + n + min(n, size - o - n))`
//!    when a next window exists,
//! 4. run the callback over the window,
//! 5. advance.
//!
//! Request ids equal window indices. Once the foreground reaches a window it
//! faults the pages itself, so reading them again on the worker only competes
//! for I/O; cancelling lets the worker drop the rest of that range.
//!
//! # Teardown
//!
//! On every exit path (success, map failure) the worker is signalled and
//! joined before the window manager unmaps and closes the file.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ScanConfig, ScanMode};
use crate::error::ScanError;
use crate::prefetch::{PrefetchRequest, PrefetchStats, PrefetchWorker, ReadAt, RequestId};
use crate::trace::{TraceLane, TraceScope, TraceSink};
use crate::window::{page_size, prefault, Advance, WindowManager};

/// Summary of one completed scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub file_size: u64,
    /// Windows handed to the callback.
    pub windows: u64,
    pub bytes_scanned: u64,
    pub requests_submitted: u64,
    /// Requests dropped because the request channel was full.
    pub requests_rejected: u64,
    pub cancels_submitted: u64,
    /// Cancellations dropped because the cancel channel was full.
    pub cancels_rejected: u64,
    /// Worker counters; all zero in direct mode.
    pub prefetch: PrefetchStats,
    pub elapsed: Duration,
}

/// Scans `path` window by window, calling `f` once per window in offset
/// order on the calling thread.
///
/// An empty file returns a zero report without starting the worker or
/// calling `f`.
///
/// # Errors
/// Setup failures (config, open, first map, worker spawn) and a failure to
/// map any later window. Prefetch problems are reported in
/// [`ScanReport::prefetch`] instead.
pub fn scan_file<F>(
    path: &Path,
    config: &ScanConfig,
    sink: Arc<dyn TraceSink>,
    mut f: F,
) -> Result<ScanReport, ScanError>
where
    F: FnMut(&[u8]),
{
    config.validate()?;
    let started = Instant::now();

    let mut windows = WindowManager::open(path, config.window_size)?;
    let mut report = ScanReport {
        file_size: windows.file_size(),
        ..ScanReport::default()
    };

    if !windows.is_eof() {
        let _scope = TraceScope::enter(sink.as_ref(), TraceLane::Main, "SCAN");
        match config.mode {
            ScanMode::Prefetch => {
                scan_prefetch(&mut windows, config, Arc::clone(&sink), &mut f, &mut report)?
            }
            ScanMode::Direct => scan_direct(&mut windows, sink.as_ref(), &mut f, &mut report)?,
        }
    }

    windows.close();
    report.elapsed = started.elapsed();
    Ok(report)
}

fn scan_prefetch<F>(
    windows: &mut WindowManager,
    config: &ScanConfig,
    sink: Arc<dyn TraceSink>,
    f: &mut F,
    report: &mut ScanReport,
) -> Result<(), ScanError>
where
    F: FnMut(&[u8]),
{
    let Some(file) = windows.source() else {
        return Ok(());
    };
    let source: Arc<dyn ReadAt> = file;

    let mut worker =
        PrefetchWorker::spawn(config, Arc::clone(&sink)).map_err(ScanError::WorkerSpawn)?;

    let walked = walk_prefetch(windows, config, sink.as_ref(), &source, &mut worker, f, report);

    // Join before the caller unmaps, regardless of how the walk ended.
    let joined = worker.shutdown();
    walked?;
    report.prefetch = joined?;
    Ok(())
}

fn walk_prefetch<F>(
    windows: &mut WindowManager,
    config: &ScanConfig,
    sink: &dyn TraceSink,
    source: &Arc<dyn ReadAt>,
    worker: &mut PrefetchWorker,
    f: &mut F,
    report: &mut ScanReport,
) -> Result<(), ScanError>
where
    F: FnMut(&[u8]),
{
    let file_size = windows.file_size();
    let page = page_size();
    let mut outstanding: Option<RequestId> = None;

    while let Some(window) = windows.current() {
        let index = report.windows;
        sink.mark_fmt(TraceLane::Main, format_args!("MAIN-BEGIN {index}"));

        sink.mark_fmt(TraceLane::Main, format_args!("MAIN-PREFAULT {index}"));
        prefault(window.bytes, page, config.prefault_stride);

        if let Some(id) = outstanding.take() {
            if worker.cancel(id) {
                report.cancels_submitted += 1;
            } else {
                report.cancels_rejected += 1;
            }
        }

        let next_offset = window.end();
        if next_offset < file_size {
            let id = RequestId(index + 1);
            let length = (window.len() as u64).min(file_size - next_offset);
            sink.mark_fmt(TraceLane::Main, format_args!("MAIN-PREFETCH {id}"));
            let request = PrefetchRequest {
                id,
                source: Arc::clone(source),
                offset: next_offset,
                length,
            };
            if worker.submit(request) {
                report.requests_submitted += 1;
                outstanding = Some(id);
            } else {
                report.requests_rejected += 1;
            }
        }

        sink.mark_fmt(TraceLane::Main, format_args!("MAIN-PROCESS {index}"));
        f(window.bytes);
        report.windows += 1;
        report.bytes_scanned += window.len() as u64;

        if windows.advance()? == Advance::EndOfFile {
            break;
        }
    }
    Ok(())
}

fn scan_direct<F>(
    windows: &mut WindowManager,
    sink: &dyn TraceSink,
    f: &mut F,
    report: &mut ScanReport,
) -> Result<(), ScanError>
where
    F: FnMut(&[u8]),
{
    while let Some(window) = windows.current() {
        sink.mark_fmt(TraceLane::Main, format_args!("TICK {}", report.windows));
        f(window.bytes);
        report.windows += 1;
        report.bytes_scanned += window.len() as u64;

        if windows.advance()? == Advance::EndOfFile {
            break;
        }
    }
    Ok(())
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::trace::{NoopSink, RecordingSink};
    use crate::window::alloc_granularity;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_of(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn small_config(mode: ScanMode) -> ScanConfig {
        ScanConfig {
            window_size: alloc_granularity(),
            chunk_size: 1024,
            mode,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn prefetch_scan_visits_windows_in_order() {
        let window = alloc_granularity();
        let file = file_of(window * 2 + window / 2);
        let sink = Arc::new(RecordingSink::new());

        let mut seen = Vec::new();
        let report = scan_file(
            file.path(),
            &small_config(ScanMode::Prefetch),
            sink.clone(),
            |bytes| seen.push(bytes.len()),
        )
        .unwrap();

        assert_eq!(seen, vec![window, window, window / 2]);
        assert_eq!(report.windows, 3);
        assert_eq!(report.bytes_scanned, report.file_size);
        assert_eq!(report.requests_submitted, 2);
        assert_eq!(report.cancels_submitted, 2);
        assert_eq!(report.prefetch.requests_started, 2);
        assert_eq!(
            report.prefetch.requests_completed + report.prefetch.requests_cancelled,
            2
        );

        let marks = sink.marks(TraceLane::Main);
        assert_eq!(
            marks,
            vec![
                "MAIN-BEGIN 0",
                "MAIN-PREFAULT 0",
                "MAIN-PREFETCH 1",
                "MAIN-PROCESS 0",
                "MAIN-BEGIN 1",
                "MAIN-PREFAULT 1",
                "MAIN-PREFETCH 2",
                "MAIN-PROCESS 1",
                "MAIN-BEGIN 2",
                "MAIN-PREFAULT 2",
                "MAIN-PROCESS 2",
            ]
        );
    }

    #[test]
    fn last_request_is_clamped_to_file_end() {
        let window = alloc_granularity();
        let file = file_of(window + 10);
        let report = scan_file(
            file.path(),
            &small_config(ScanMode::Prefetch),
            Arc::new(NoopSink),
            |_| {},
        )
        .unwrap();
        assert_eq!(report.requests_submitted, 1);
        assert!(report.prefetch.bytes_warmed <= 10);
        assert_eq!(report.prefetch.short_reads, 0);
    }

    #[test]
    fn direct_scan_skips_worker() {
        let window = alloc_granularity();
        let file = file_of(window * 3);
        let sink = Arc::new(RecordingSink::new());
        let mut calls = 0;
        let report = scan_file(
            file.path(),
            &small_config(ScanMode::Direct),
            sink.clone(),
            |_| calls += 1,
        )
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(report.requests_submitted, 0);
        assert_eq!(report.prefetch, PrefetchStats::default());
        assert_eq!(sink.count_prefix(TraceLane::Main, "TICK"), 3);
        assert!(sink.marks(TraceLane::Task).is_empty());
    }

    #[test]
    fn empty_file_never_calls_back() {
        let file = NamedTempFile::new().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let report = scan_file(
            file.path(),
            &small_config(ScanMode::Prefetch),
            sink.clone(),
            |_| panic!("no windows expected"),
        )
        .unwrap();
        assert_eq!(report.windows, 0);
        assert_eq!(report.file_size, 0);
        assert!(sink.events().is_empty());
        // No worker was started, so it never slept.
        assert!(sink.marks(TraceLane::Task).is_empty());
    }

    #[test]
    fn invalid_config_fails_before_open() {
        let cfg = ScanConfig {
            chunk_size: 0,
            ..ScanConfig::default()
        };
        let err = scan_file(
            Path::new("/definitely/not/here"),
            &cfg,
            Arc::new(NoopSink),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig { .. }));
    }
}
