//! Read-ahead prefetch engine for sequential scans over memory-mapped files.
//!
//! ## Scope
//! A foreground thread walks a file through fixed-size mapped windows and
//! runs a computation over each one, while a background worker warms the OS
//! page cache for the next window with plain positional reads. The two
//! threads communicate only through bounded lock-free SPSC channels.
//!
//! ## Key invariants
//! - Windows tile `[0, file_size)` exactly, in offset order; at most one
//!   mapping is alive at a time.
//! - Channel operations never block; a full channel rejects the item.
//! - Nothing the worker does is fatal to the scan. Only setup failures and
//!   window map failures reach the caller.
//! - The worker is joined before the window manager unmaps and closes the
//!   file.
//!
//! ## Scan flow (prefetch mode)
//! 1) Pre-fault the current window.
//! 2) Cancel the request that was warming it.
//! 3) Submit a request for the next window.
//! 4) Run the callback over the window.
//! 5) Advance; stop at end of file.
//!
//! ## Notable entry points
//! - [`scan_file`] / [`ScanConfig`]: one-call scan of a file.
//! - [`WindowManager`]: the mapped window on its own.
//! - [`PrefetchWorker`]: the background warmer on its own.
//! - [`stdx::spsc_channel`]: the bounded SPSC channel.
//! - [`TraceSink`]: observer for state-transition markers.

pub mod checksum;
pub mod config;
pub mod error;
pub mod prefetch;
pub mod scan;
pub mod stdx;
pub mod trace;
pub mod window;

pub use checksum::{Digest, WindowHash};
pub use config::{
    ScanConfig, ScanMode, DEFAULT_CHUNK_SIZE, DEFAULT_PREFAULT_STRIDE, DEFAULT_WINDOW_SIZE,
    PREFETCH_MAX_REQUESTS,
};
pub use error::ScanError;
pub use prefetch::{PrefetchRequest, PrefetchStats, PrefetchWorker, ReadAt, RequestId};
pub use scan::{scan_file, ScanReport};
pub use trace::{
    NoopSink, RecordingSink, TraceEvent, TraceLane, TraceScope, TraceSink, WriterSink,
};
pub use window::{alloc_granularity, page_size, prefault, Advance, Window, WindowManager};
