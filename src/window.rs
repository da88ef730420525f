//! Sequential memory-mapped window over a read-only file.
//!
//! # Model
//!
//! A [`WindowManager`] maps one window of the file at a time. Windows are
//! `window_size` bytes long and laid end to end starting at offset 0; the last
//! one is shorter when the file size is not a multiple of the window size.
//! The sequence of `(offset, len)` pairs exactly tiles `[0, file_size)`.
//!
//! ```text
//! file:    [---- window 0 ----][---- window 1 ----][-- window 2 --]
//! offset:  0                   W                   2W             S
//! ```
//!
//! # Invariants
//! - `file_offset` never decreases and is always a multiple of `window_size`.
//! - At most one mapping is alive; `advance` drops it before mapping the next.
//! - After end-of-file `map_size == 0`, `current()` is `None`, and further
//!   `advance` calls keep returning `EndOfFile`.
//! - A zero-length file is at end-of-file straight out of `open`.
//!
//! # Sharing
//!
//! The file handle is kept in an `Arc<File>` so the prefetch worker can issue
//! positional reads against it without touching the mapping.

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use memmap2::{Mmap, MmapOptions};

use crate::config::validate_window_size;
use crate::error::ScanError;

// ============================================================================
// Platform helpers
// ============================================================================

/// Size of one virtual memory page in bytes.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            // Safety: sysconf has no memory-safety preconditions.
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if size > 0 {
                return size as usize;
            }
        }
        4096
    })
}

/// Alignment required for mapping offsets.
///
/// Equal to the page size on unix; Windows maps at 64 KiB boundaries.
pub fn alloc_granularity() -> usize {
    #[cfg(unix)]
    {
        page_size()
    }
    #[cfg(not(unix))]
    {
        64 * 1024
    }
}

/// Hint the kernel to use aggressive sequential readahead for the file.
#[cfg(target_os = "linux")]
fn fadvise_sequential(file: &File) {
    use std::os::unix::io::AsRawFd;
    // Safety: the fd comes from a live `File`, and `posix_fadvise` neither
    // retains pointers nor mutates Rust-owned memory.
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
    }
}

#[cfg(not(target_os = "linux"))]
fn fadvise_sequential(_file: &File) {}

/// Touches one byte every `page_size * stride` bytes of `bytes` so the pages
/// are resident before latency-sensitive work runs over them.
///
/// Returns the number of touches. The reads are volatile, so they are not
/// elided even though the values are discarded.
pub fn prefault(bytes: &[u8], page_size: usize, stride: usize) -> usize {
    let step = page_size.max(1).saturating_mul(stride.max(1));
    let mut touches = 0usize;
    let mut acc = 0u8;
    let mut pos = 0usize;
    while pos < bytes.len() {
        // Safety: `pos < bytes.len()`, so the pointer is in bounds and
        // points at initialized memory.
        acc ^= unsafe { std::ptr::read_volatile(bytes.as_ptr().add(pos)) };
        touches += 1;
        pos = pos.saturating_add(step);
    }
    std::hint::black_box(acc);
    touches
}

// ============================================================================
// Window manager
// ============================================================================

/// Result of moving to the next window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// A new window is mapped and available through `current()`.
    Continue,
    /// No bytes remain; nothing is mapped.
    EndOfFile,
}

/// Borrowed view of the currently mapped window.
///
/// Valid until the next `advance` or `close`; the borrow checker enforces
/// this because both take `&mut WindowManager`.
#[derive(Clone, Copy, Debug)]
pub struct Window<'a> {
    /// Absolute file offset of `bytes[0]`.
    pub offset: u64,
    /// The mapped bytes.
    pub bytes: &'a [u8],
}

impl Window<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset one past the last byte of this window.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }
}

/// Owns the file handle and the single live mapping.
#[derive(Debug)]
pub struct WindowManager {
    file: Option<Arc<File>>,
    mmap: Option<Mmap>,
    file_size: u64,
    file_offset: u64,
    map_size: usize,
    window_size: usize,
    eof: bool,
}

impl WindowManager {
    /// Opens `path` read-only and maps the first window.
    ///
    /// A zero-length file opens successfully in the end-of-file state.
    ///
    /// # Errors
    /// - `InvalidConfig` if `window_size` is not a nonzero multiple of
    ///   [`alloc_granularity`].
    /// - `Open` / `Metadata` if the file cannot be opened or sized.
    /// - `Map` if the first window cannot be mapped. The file handle is
    ///   released before returning.
    pub fn open(path: &Path, window_size: usize) -> Result<Self, ScanError> {
        validate_window_size(window_size)?;

        let file = File::open(path).map_err(|source| ScanError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file
            .metadata()
            .map_err(|source| ScanError::Metadata {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        fadvise_sequential(&file);

        let mut windows = Self {
            file: Some(Arc::new(file)),
            mmap: None,
            file_size,
            file_offset: 0,
            map_size: 0,
            window_size,
            eof: false,
        };
        // On error `windows` drops here, closing the file.
        windows.map_current()?;
        Ok(windows)
    }

    /// Releases the current window and maps the next one.
    ///
    /// Returns `EndOfFile` (repeatedly, if called again) once the previous
    /// window was the last one.
    ///
    /// # Errors
    /// `Map` if the next window cannot be mapped. The previous mapping has
    /// already been released when this is returned.
    pub fn advance(&mut self) -> Result<Advance, ScanError> {
        if self.eof {
            return Ok(Advance::EndOfFile);
        }
        self.mmap = None;
        self.file_offset += self.map_size as u64;
        self.map_size = 0;
        self.map_current()
    }

    /// The currently mapped window, or `None` at end-of-file.
    #[inline]
    pub fn current(&self) -> Option<Window<'_>> {
        self.mmap.as_ref().map(|mmap| Window {
            offset: self.file_offset,
            bytes: &mmap[..self.map_size],
        })
    }

    /// Unmaps the window and closes the file. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.mmap = None;
        self.file = None;
        self.map_size = 0;
        self.eof = true;
    }

    /// Whether the manager is past the last window (or closed).
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Size of the file when it was opened.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Start offset of the current window.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Bytes mapped in the current window (0 at end-of-file).
    #[inline]
    pub fn map_size(&self) -> usize {
        self.map_size
    }

    /// Configured window size.
    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Shared handle to the underlying file for independent positional reads.
    ///
    /// `None` after `close`.
    pub fn source(&self) -> Option<Arc<File>> {
        self.file.clone()
    }

    /// Maps the window starting at `file_offset`, or enters end-of-file.
    fn map_current(&mut self) -> Result<Advance, ScanError> {
        let remaining = self.file_size.saturating_sub(self.file_offset);
        let Some(file) = self.file.as_ref().filter(|_| remaining > 0) else {
            self.eof = true;
            self.map_size = 0;
            return Ok(Advance::EndOfFile);
        };

        let len = remaining.min(self.window_size as u64) as usize;
        debug_assert_eq!(self.file_offset % alloc_granularity() as u64, 0);

        // Safety: the mapping is read-only and private to this manager. As
        // with any file mapping, truncation of the file by another process
        // while mapped is outside what this type can guard against.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(self.file_offset)
                .len(len)
                .map(&**file)
        }
        .map_err(|source| ScanError::Map {
            offset: self.file_offset,
            source,
        })?;

        #[cfg(unix)]
        {
            // Advisory only; failure changes nothing observable.
            let _ = mmap.advise(memmap2::Advice::Sequential);
        }

        self.mmap = Some(mmap);
        self.map_size = len;
        Ok(Advance::Continue)
    }
}

impl Drop for WindowManager {
    fn drop(&mut self) {
        self.close();
    }
}
