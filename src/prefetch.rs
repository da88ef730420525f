//! Background prefetch worker.
//!
//! # Architecture
//!
//! The worker is one OS thread fed by two bounded SPSC channels owned by the
//! foreground scan thread:
//!
//! - a request channel of [`PrefetchRequest`]s (byte ranges to warm), and
//! - a cancel channel of [`RequestId`]s.
//!
//! Warming is done with plain positional reads into a scratch buffer that is
//! allocated once when the thread starts. The data is discarded; the point is
//! to pull the range into the OS page cache so that page faults on the
//! foreground mapping are cheap. The worker never touches the mapping.
//!
//! # State machine
//!
//! ```text
//!            exit
//! WAITING ---------> STOPPED
//!    | work
//!    v          empty (drop pending cancels)
//! DRAINING --------------------------------> WAITING
//!    | popped request
//!    v
//! CANCEL-CHECK --cancelled / done / error--> DRAINING
//!    |    ^
//!    v    | chunk read
//!   WARMING
//! ```
//!
//! Only `WAITING` blocks. Cancellation is checked before every chunk, so the
//! latency of a cancel is bounded by one chunk read. Exit is also observed at
//! that point, which keeps shutdown prompt even with a long queue.
//!
//! # Failure model
//!
//! Nothing the worker does is fatal to the scan. Read errors and short reads
//! are counted in [`PrefetchStats`] and traced; the worker moves on to the next
//! request.

use std::fmt;
use std::fs::File;
use std::io;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::{ScanConfig, PREFETCH_MAX_REQUESTS};
use crate::error::ScanError;
use crate::stdx::{spsc_channel, FixedVec, SpscConsumer, SpscProducer};
use crate::trace::{TraceLane, TraceScope, TraceSink};

/// Capacity of the worker's local list of not-yet-matched cancellations.
const PENDING_CANCEL_CAP: usize = PREFETCH_MAX_REQUESTS * 2;

// ============================================================================
// Requests
// ============================================================================

/// Caller-assigned request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Positional read source shared between the scan thread and the worker.
pub trait ReadAt: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Same contract as `pread`: `Ok(0)` means end of file, a short count is
    /// allowed, and `Interrupted` may be retried.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    fn read_at(&self, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// One byte range to warm.
#[derive(Clone)]
pub struct PrefetchRequest {
    pub id: RequestId,
    pub source: Arc<dyn ReadAt>,
    /// Absolute byte offset; need not be page aligned.
    pub offset: u64,
    pub length: u64,
}

impl fmt::Debug for PrefetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchRequest")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Counters reported by the worker when it is joined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Requests popped from the request channel.
    pub requests_started: u64,
    /// Requests whose whole range was read (or hit end of file).
    pub requests_completed: u64,
    /// Requests abandoned because a matching cancellation arrived.
    pub requests_cancelled: u64,
    /// Requests abandoned because a read failed.
    pub read_errors: u64,
    /// Requests that ended early at end of file.
    pub short_reads: u64,
    /// Bytes pulled through the scratch buffer.
    pub bytes_warmed: u64,
    /// Times the worker left `WAITING`.
    pub wakeups: u64,
}

// ============================================================================
// Signals
// ============================================================================

#[derive(Default)]
struct SignalState {
    exit: bool,
    work: bool,
}

/// Two-event wake source: exit (sticky) and work available (auto-cleared on
/// wake). Exit wins when both are set.
#[derive(Default)]
struct Signals {
    state: Mutex<SignalState>,
    cv: Condvar,
    /// Lock-free mirror of `state.exit` for polling between chunks.
    exit_requested: AtomicBool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wake {
    Exit,
    Work,
}

impl Signals {
    fn lock(&self) -> std::sync::MutexGuard<'_, SignalState> {
        // The critical sections cannot panic, so a poisoned lock still holds
        // consistent flags.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn raise_work(&self) {
        self.lock().work = true;
        self.cv.notify_one();
    }

    fn raise_exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
        self.lock().exit = true;
        self.cv.notify_one();
    }

    #[inline]
    fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    fn wait(&self) -> Wake {
        let mut state = self.lock();
        loop {
            if state.exit {
                return Wake::Exit;
            }
            if state.work {
                state.work = false;
                return Wake::Work;
            }
            state = self.cv.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

// ============================================================================
// Worker thread
// ============================================================================

type RequestTx = SpscProducer<PrefetchRequest, PREFETCH_MAX_REQUESTS>;
type RequestRx = SpscConsumer<PrefetchRequest, PREFETCH_MAX_REQUESTS>;
type CancelTx = SpscProducer<RequestId, PREFETCH_MAX_REQUESTS>;
type CancelRx = SpscConsumer<RequestId, PREFETCH_MAX_REQUESTS>;

enum Outcome {
    Completed,
    ShortRead,
    Cancelled,
    Failed(io::Error),
    Stopped,
}

struct WorkerLoop {
    requests: RequestRx,
    cancels: CancelRx,
    signals: Arc<Signals>,
    sink: Arc<dyn TraceSink>,
    pending: FixedVec<RequestId, PENDING_CANCEL_CAP>,
    buf: Vec<u8>,
    stats: PrefetchStats,
}

impl WorkerLoop {
    fn run(mut self) -> PrefetchStats {
        loop {
            self.sink.mark(TraceLane::Task, "PREFETCH-SLEEP");
            let wake = self.signals.wait();
            self.sink.mark(TraceLane::Task, "PREFETCH-WAKE");
            self.stats.wakeups += 1;
            if wake == Wake::Exit {
                break;
            }
            if !self.drain() {
                break;
            }
        }
        self.stats
    }

    /// Processes queued requests until the channel is empty.
    ///
    /// Returns false if exit was requested mid-request.
    fn drain(&mut self) -> bool {
        while let Some(request) = self.requests.try_pop() {
            self.stats.requests_started += 1;
            self.sink
                .mark_fmt(TraceLane::Task, format_args!("PREFETCH-START {}", request.id));

            let sink = Arc::clone(&self.sink);
            let outcome = {
                let _scope = TraceScope::enter(sink.as_ref(), TraceLane::Task, "PREFETCH-WARM");
                self.warm(&request)
            };
            match outcome {
                Outcome::Completed => {
                    self.stats.requests_completed += 1;
                    self.sink
                        .mark_fmt(TraceLane::Task, format_args!("PREFETCH-FINISH {}", request.id));
                }
                Outcome::ShortRead => {
                    self.stats.requests_completed += 1;
                    self.stats.short_reads += 1;
                    self.sink
                        .mark_fmt(TraceLane::Task, format_args!("PREFETCH-FINISH {}", request.id));
                }
                Outcome::Cancelled => {
                    self.stats.requests_cancelled += 1;
                    self.sink
                        .mark_fmt(TraceLane::Task, format_args!("PREFETCH-CANCEL {}", request.id));
                }
                Outcome::Failed(err) => {
                    self.stats.read_errors += 1;
                    self.sink.mark_fmt(
                        TraceLane::Task,
                        format_args!("PREFETCH-ERROR {} {}", request.id, err),
                    );
                }
                Outcome::Stopped => return false,
            }
        }
        // Cancels that never matched refer to requests that already finished.
        self.pending.clear();
        true
    }

    fn warm(&mut self, request: &PrefetchRequest) -> Outcome {
        let mut done = 0u64;
        while done < request.length {
            if self.cancel_requested(request.id) {
                return Outcome::Cancelled;
            }
            if self.signals.exit_requested() {
                return Outcome::Stopped;
            }

            let want = (request.length - done).min(self.buf.len() as u64) as usize;
            match request.source.read_at(&mut self.buf[..want], request.offset + done) {
                Ok(0) => return Outcome::ShortRead,
                Ok(n) => {
                    done += n as u64;
                    self.stats.bytes_warmed += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Outcome::Failed(err),
            }
        }
        Outcome::Completed
    }

    /// Moves queued cancellations into the pending list and consumes the one
    /// matching `id`, if any.
    fn cancel_requested(&mut self, id: RequestId) -> bool {
        // One batch covers the whole channel, so a single pass drains it.
        let mut batch = [MaybeUninit::<RequestId>::uninit(); PREFETCH_MAX_REQUESTS];
        let popped = self.cancels.try_pop_batch(&mut batch);
        for slot in &batch[..popped] {
            // SAFETY: try_pop_batch initialized batch[..popped].
            let cancel = unsafe { slot.assume_init() };
            if let Err(cancel) = self.pending.try_push(cancel) {
                // Full: evict slot 0 to make room.
                self.pending.swap_remove(0);
                let _ = self.pending.try_push(cancel);
            }
        }
        self.pending.remove_item(&id)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Foreground handle to a running prefetch worker.
///
/// Owns the producer side of both channels. The thread starts parked in
/// `WAITING`; `submit` wakes it. `shutdown` (or drop) signals exit and joins.
pub struct PrefetchWorker {
    requests: RequestTx,
    cancels: CancelTx,
    signals: Arc<Signals>,
    handle: Option<JoinHandle<PrefetchStats>>,
}

impl PrefetchWorker {
    /// Starts the worker thread.
    ///
    /// The scratch buffer (`config.chunk_size` bytes) is allocated on the
    /// worker thread before it first parks.
    pub fn spawn(config: &ScanConfig, sink: Arc<dyn TraceSink>) -> io::Result<Self> {
        let (requests, requests_rx) = spsc_channel::<PrefetchRequest, PREFETCH_MAX_REQUESTS>();
        let (cancels, cancels_rx) = spsc_channel::<RequestId, PREFETCH_MAX_REQUESTS>();
        let signals = Arc::new(Signals::default());
        let chunk_size = config.chunk_size.max(1);

        let worker_signals = Arc::clone(&signals);
        let handle = thread::Builder::new()
            .name("prefetch-worker".to_string())
            .spawn(move || {
                WorkerLoop {
                    requests: requests_rx,
                    cancels: cancels_rx,
                    signals: worker_signals,
                    sink,
                    pending: FixedVec::new(),
                    buf: vec![0u8; chunk_size],
                    stats: PrefetchStats::default(),
                }
                .run()
            })?;

        Ok(Self {
            requests,
            cancels,
            signals,
            handle: Some(handle),
        })
    }

    /// Queues a request and wakes the worker.
    ///
    /// Returns false if the request channel is full; the request is dropped.
    pub fn submit(&mut self, request: PrefetchRequest) -> bool {
        if self.requests.try_push(request).is_err() {
            return false;
        }
        self.signals.raise_work();
        true
    }

    /// Queues a cancellation for `id`.
    ///
    /// Returns false if the cancel channel is full. Cancelling an unknown or
    /// finished request is accepted and has no effect.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        self.cancels.try_push(id).is_ok()
    }

    /// Signals exit and joins the worker thread.
    ///
    /// Requests still queued are dropped without being read.
    pub fn shutdown(mut self) -> Result<PrefetchStats, ScanError> {
        self.join().unwrap_or(Err(ScanError::WorkerPanicked))
    }

    fn join(&mut self) -> Option<Result<PrefetchStats, ScanError>> {
        let handle = self.handle.take()?;
        self.signals.raise_exit();
        Some(handle.join().map_err(|_| ScanError::WorkerPanicked))
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

impl fmt::Debug for PrefetchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchWorker")
            .field("queued_requests", &self.requests.len())
            .field("running", &self.handle.is_some())
            .finish()
    }
}
