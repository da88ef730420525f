//! Trace markers and timed scopes for the scan pipeline.
//!
//! # Architecture
//!
//! The orchestrator and the prefetch worker report state transitions
//! (sleep/wake, request start/cancel/finish, prefault, process) through a
//! [`TraceSink`]. The sink is injected as `Arc<dyn TraceSink>`; the core never
//! inspects what the sink does with an event, and a [`NoopSink`] leaves
//! scheduling and results unchanged.
//!
//! Events are tagged with a [`TraceLane`]: `Main` for the foreground scan
//! thread, `Task` for the background worker. Sinks that track scope nesting
//! keep one depth counter per lane ([`LaneDepths`]) instead of thread-local
//! storage, so depths stay correct no matter which OS thread runs a lane.
//!
//! # Sinks
//!
//! - [`NoopSink`]: discards everything without formatting markers.
//! - [`WriterSink`]: one text line per event to any `Write` (stderr by
//!   default).
//! - [`RecordingSink`]: keeps events in memory for assertions in tests.

use std::fmt;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Core types
// ============================================================================

/// Logical thread an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceLane {
    /// Foreground scan thread.
    Main,
    /// Background prefetch worker.
    Task,
}

impl TraceLane {
    const COUNT: usize = 2;

    #[inline]
    fn index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Task => 1,
        }
    }

    /// Short label used in text output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Task => "task",
        }
    }
}

/// Opaque value returned by [`TraceSink::enter_scope`] and handed back to
/// [`TraceSink::leave_scope`].
#[derive(Clone, Copy, Debug)]
pub struct ScopeToken {
    entered: Option<Instant>,
}

impl ScopeToken {
    /// Token for sinks that do not measure time.
    pub const NONE: ScopeToken = ScopeToken { entered: None };

    /// Token stamped with the current time.
    #[inline]
    pub fn now() -> Self {
        Self {
            entered: Some(Instant::now()),
        }
    }

    /// Time elapsed since the token was created, or zero for [`Self::NONE`].
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.entered.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// Destination for trace markers and scopes.
///
/// Implementations must be callable from the scan thread and the worker
/// thread concurrently and must never block for long: markers are emitted
/// on the hot path between windows.
pub trait TraceSink: Send + Sync {
    /// Emits an instant marker.
    fn mark(&self, lane: TraceLane, name: &str);

    /// Emits an instant marker built from format arguments.
    fn mark_fmt(&self, lane: TraceLane, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(name) => self.mark(lane, name),
            None => self.mark(lane, &args.to_string()),
        }
    }

    /// Opens a timed scope.
    fn enter_scope(&self, lane: TraceLane, name: &str) -> ScopeToken;

    /// Closes a scope opened by `enter_scope`.
    fn leave_scope(&self, lane: TraceLane, name: &str, token: ScopeToken);

    /// Flushes buffered output. Called once at end-of-run.
    fn flush(&self) {}
}

/// RAII scope guard: enters on construction, leaves on drop.
pub struct TraceScope<'a> {
    sink: &'a dyn TraceSink,
    lane: TraceLane,
    name: &'static str,
    token: ScopeToken,
}

impl<'a> TraceScope<'a> {
    pub fn enter(sink: &'a dyn TraceSink, lane: TraceLane, name: &'static str) -> Self {
        let token = sink.enter_scope(lane, name);
        Self {
            sink,
            lane,
            name,
            token,
        }
    }
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        self.sink.leave_scope(self.lane, self.name, self.token);
    }
}

// ============================================================================
// Per-lane scope depth
// ============================================================================

/// Scope nesting depth keyed by lane.
///
/// Each lane is driven by exactly one thread at a time, so relaxed ordering
/// is enough; the atomics only make the table shareable.
#[derive(Debug, Default)]
pub struct LaneDepths {
    depth: [AtomicU32; TraceLane::COUNT],
}

impl LaneDepths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the lane depth and returns the depth of the new scope.
    #[inline]
    pub fn enter(&self, lane: TraceLane) -> u32 {
        self.depth[lane.index()].fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lane depth and returns the depth of the closed scope.
    ///
    /// An unbalanced leave saturates at zero.
    #[inline]
    pub fn leave(&self, lane: TraceLane) -> u32 {
        self.depth[lane.index()]
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap_or(0)
    }

    /// Current depth of `lane`.
    #[inline]
    pub fn get(&self, lane: TraceLane) -> u32 {
        self.depth[lane.index()].load(Ordering::Relaxed)
    }
}

// ============================================================================
// Null sink
// ============================================================================

/// Sink that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    #[inline]
    fn mark(&self, _lane: TraceLane, _name: &str) {}

    #[inline]
    fn mark_fmt(&self, _lane: TraceLane, _args: fmt::Arguments<'_>) {}

    #[inline]
    fn enter_scope(&self, _lane: TraceLane, _name: &str) -> ScopeToken {
        ScopeToken::NONE
    }

    #[inline]
    fn leave_scope(&self, _lane: TraceLane, _name: &str, _token: ScopeToken) {}
}

// ============================================================================
// Text sink
// ============================================================================

/// Default buffer size (16 KiB) for buffered trace output.
const DEFAULT_BUF_CAPACITY: usize = 16 * 1024;

/// Text sink: one line per event.
///
/// Line format: `+<micros>us [<lane>] <indent><event>` where `<indent>` is two
/// spaces per open scope on that lane. Scope exits carry the elapsed time.
///
/// Lines are formatted into a thread-local buffer; the mutex is held only for
/// `write_all`. A closed pipe silences the sink instead of failing the scan.
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
    depths: LaneDepths,
    origin: Instant,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::with_capacity(DEFAULT_BUF_CAPACITY, writer)),
            depths: LaneDepths::new(),
            origin: Instant::now(),
        }
    }

    fn emit(&self, lane: TraceLane, depth: u32, args: fmt::Arguments<'_>) {
        thread_local! {
            static LINE_BUF: std::cell::RefCell<Vec<u8>> = std::cell::RefCell::new(Vec::with_capacity(128));
        }
        LINE_BUF.with(|cell| {
            let mut buf = cell.borrow_mut();
            buf.clear();
            let micros = self.origin.elapsed().as_micros();
            // Writes into a Vec cannot fail.
            let _ = write!(buf, "+{micros}us [{}] ", lane.as_str());
            for _ in 0..depth {
                buf.extend_from_slice(b"  ");
            }
            let _ = buf.write_fmt(args);
            buf.push(b'\n');

            let mut writer = match self.writer.lock() {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
            if let Err(e) = writer.write_all(&buf) {
                if e.kind() != ErrorKind::BrokenPipe {
                    eprintln!("trace sink write failed: {e}");
                }
            }
        });
    }
}

impl WriterSink<io::Stderr> {
    /// Sink writing to the process's stderr.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TraceSink for WriterSink<W> {
    fn mark(&self, lane: TraceLane, name: &str) {
        self.emit(lane, self.depths.get(lane), format_args!("{name}"));
    }

    fn mark_fmt(&self, lane: TraceLane, args: fmt::Arguments<'_>) {
        self.emit(lane, self.depths.get(lane), args);
    }

    fn enter_scope(&self, lane: TraceLane, name: &str) -> ScopeToken {
        let depth = self.depths.enter(lane);
        self.emit(lane, depth - 1, format_args!("> {name}"));
        ScopeToken::now()
    }

    fn leave_scope(&self, lane: TraceLane, name: &str, token: ScopeToken) {
        let elapsed = token.elapsed();
        let depth = self.depths.leave(lane);
        self.emit(
            lane,
            depth.saturating_sub(1),
            format_args!("< {name} ({}us)", elapsed.as_micros()),
        );
    }

    fn flush(&self) {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        if let Err(e) = writer.flush() {
            if e.kind() != ErrorKind::BrokenPipe {
                eprintln!("trace sink flush failed: {e}");
            }
        }
    }
}

impl<W: Write + Send> Drop for WriterSink<W> {
    fn drop(&mut self) {
        self.flush();
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// A single recorded trace event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Mark {
        lane: TraceLane,
        name: String,
    },
    Enter {
        lane: TraceLane,
        name: String,
        depth: u32,
    },
    Leave {
        lane: TraceLane,
        name: String,
        depth: u32,
    },
}

/// Sink that keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TraceEvent>>,
    depths: LaneDepths,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: TraceEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poison) => poison.into_inner().push(event),
        }
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Marker names recorded on `lane`, in order.
    pub fn marks(&self, lane: TraceLane) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TraceEvent::Mark { lane: l, name } if l == lane => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Number of markers on `lane` whose name starts with `prefix`.
    pub fn count_prefix(&self, lane: TraceLane, prefix: &str) -> usize {
        self.marks(lane)
            .iter()
            .filter(|name| name.starts_with(prefix))
            .count()
    }
}

impl TraceSink for RecordingSink {
    fn mark(&self, lane: TraceLane, name: &str) {
        self.push(TraceEvent::Mark {
            lane,
            name: name.to_owned(),
        });
    }

    fn enter_scope(&self, lane: TraceLane, name: &str) -> ScopeToken {
        let depth = self.depths.enter(lane);
        self.push(TraceEvent::Enter {
            lane,
            name: name.to_owned(),
            depth,
        });
        ScopeToken::now()
    }

    fn leave_scope(&self, lane: TraceLane, name: &str, _token: ScopeToken) {
        let depth = self.depths.leave(lane);
        self.push(TraceEvent::Leave {
            lane,
            name: name.to_owned(),
            depth,
        });
    }
}
