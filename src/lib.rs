//! Segmented, append-only commit log storage.
//!
//! The crate provides the storage substrate for a log-based service:
//! - [`storage::store::Store`]: length-prefixed record bytes on disk
//! - [`storage::index::Index`]: memory-mapped relative offset → position table
//! - [`storage::segment::Segment`]: one store + one index over a contiguous
//!   offset range, with size limits and crash recovery
//!
//! Choosing the active segment among many, rotation policy, and any network
//! surface belong to the owning log.
pub mod config;
pub mod error;
pub mod storage;

pub use config::{Config, SegmentConfig};
pub use error::{LogError, Result};
pub use storage::record::{LogRecord, Record};
pub use storage::segment::{nearest_multiple, Segment};
