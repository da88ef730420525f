//! Property-based tests.
//!
//! Run with: `cargo test --test property --features stdx-proptest`

mod scan_coverage;
mod window_tiling;
