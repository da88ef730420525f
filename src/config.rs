//! Scan configuration and tuning constants.
//!
//! There is no config file: the CLI maps its flags onto [`ScanConfig`] and
//! library callers build one directly, usually starting from `Default`.
//!
//! # Invariants
//! - `window_size` is a nonzero multiple of the platform allocation
//!   granularity, so every window offset is a valid mapping offset.
//! - `chunk_size` and `prefault_stride` are nonzero.

use crate::error::ScanError;
use crate::window::alloc_granularity;

/// Default size of one mapped window (2 MiB).
pub const DEFAULT_WINDOW_SIZE: usize = 2 * 1024 * 1024;

/// Default size of one warming read issued by the prefetch worker (1 MiB).
///
/// Independent of the window size: it only bounds how long the worker goes
/// between cancellation checks.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum number of queued prefetch requests (and queued cancellations).
///
/// Must be a power of two; the channels check this at compile time.
pub const PREFETCH_MAX_REQUESTS: usize = 64;

/// Default number of pages between pre-fault touches (1 = every page).
pub const DEFAULT_PREFAULT_STRIDE: usize = 1;

/// How the foreground loop treats each window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Pre-fault the current window and warm the next one on a background
    /// worker while computing.
    #[default]
    Prefetch,
    /// Map, compute, advance. No pre-fault and no worker; page faults are
    /// taken inside the computation. Useful as a baseline.
    Direct,
}

impl ScanMode {
    /// Parses the CLI spelling (`prefetch` or `direct`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prefetch" => Some(Self::Prefetch),
            "direct" | "default" => Some(Self::Direct),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefetch => "prefetch",
            Self::Direct => "direct",
        }
    }
}

/// Configuration for one file scan.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Bytes per mapped window. The final window may be shorter.
    pub window_size: usize,
    /// Bytes per warming read on the prefetch worker.
    pub chunk_size: usize,
    /// Pages between pre-fault touches.
    pub prefault_stride: usize,
    /// Foreground strategy.
    pub mode: ScanMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefault_stride: DEFAULT_PREFAULT_STRIDE,
            mode: ScanMode::Prefetch,
        }
    }
}

impl ScanConfig {
    /// Checks field ranges.
    pub fn validate(&self) -> Result<(), ScanError> {
        validate_window_size(self.window_size)?;
        if self.chunk_size == 0 {
            return Err(ScanError::invalid_config("chunk_size", "must be > 0"));
        }
        if self.chunk_size > self.window_size {
            return Err(ScanError::invalid_config(
                "chunk_size",
                format!(
                    "{} exceeds window_size ({})",
                    self.chunk_size, self.window_size
                ),
            ));
        }
        if self.prefault_stride == 0 {
            return Err(ScanError::invalid_config("prefault_stride", "must be > 0"));
        }
        Ok(())
    }
}

/// Checks that `window_size` is a nonzero multiple of the allocation
/// granularity.
pub(crate) fn validate_window_size(window_size: usize) -> Result<(), ScanError> {
    let granularity = alloc_granularity();
    if window_size == 0 || window_size % granularity != 0 {
        return Err(ScanError::invalid_config(
            "window_size",
            format!("{window_size} is not a nonzero multiple of the allocation granularity ({granularity})"),
        ));
    }
    Ok(())
}
