//! Error type for scan setup and window advance failures.
//!
//! Only failures the caller must act on are represented here: opening the
//! file, mapping a window, bad configuration, and worker lifecycle faults.
//! Prefetch-side problems (full channels, failed warm reads, cancellation
//! races) never surface as errors; they only show up in `PrefetchStats`.
//!
//! # Design Notes
//! - The enum is `#[non_exhaustive]`; consumers should include a fallback arm.
//! - I/O errors preserve their source to keep diagnostics actionable.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that abort a scan.
#[derive(Debug)]
#[non_exhaustive]
pub enum ScanError {
    /// The file could not be opened.
    Open { path: PathBuf, source: io::Error },
    /// The file size could not be queried.
    Metadata { path: PathBuf, source: io::Error },
    /// Mapping the window starting at `offset` failed.
    Map { offset: u64, source: io::Error },
    /// A `ScanConfig` field is out of range.
    InvalidConfig { field: &'static str, detail: String },
    /// The prefetch worker thread could not be started.
    WorkerSpawn(io::Error),
    /// The prefetch worker thread panicked before it could be joined.
    WorkerPanicked,
}

impl ScanError {
    /// Creates an `InvalidConfig` error.
    #[inline]
    pub fn invalid_config(field: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "unable to open file '{}': {source}", path.display())
            }
            Self::Metadata { path, source } => {
                write!(f, "unable to stat file '{}': {source}", path.display())
            }
            Self::Map { offset, source } => {
                write!(f, "unable to map view at byte offset {offset}: {source}")
            }
            Self::InvalidConfig { field, detail } => {
                write!(f, "invalid config `{field}`: {detail}")
            }
            Self::WorkerSpawn(err) => write!(f, "unable to start prefetch worker: {err}"),
            Self::WorkerPanicked => write!(f, "prefetch worker panicked"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } | Self::Metadata { source, .. } | Self::Map { source, .. } => {
                Some(source)
            }
            Self::WorkerSpawn(err) => Some(err),
            _ => None,
        }
    }
}
