//! Durable store backends.
//!
//! - [`MemoryStore`]: in-process map, with call counters and fault injection
//! - [`FsStore`]: local directory with JSON sidecar metadata
//! - `S3Store`: S3-compatible bucket (requires the `s3` feature)

pub mod fs;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use fs::FsStore;
pub use memory::{MemoryStore, StoreCallCounts};
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Store};
