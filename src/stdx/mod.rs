//! Small, self-contained data structures used across the project.

pub mod fixed_vec;
pub mod spsc;

pub use fixed_vec::FixedVec;
pub use spsc::{spsc_channel, SpscConsumer, SpscProducer};
