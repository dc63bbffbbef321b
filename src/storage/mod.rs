/// Storage layer for the commit log
///
/// - Store: append-only file of length-prefixed record bytes
/// - Index: memory-mapped relative offset → store position table
/// - Segment: binds one store and one index over `[base_offset, next_offset)`
/// - Mmap: the only place the crate touches mapped memory directly
/// - Record: the codec contract plus the default protobuf record
pub mod index;
pub mod mmap;
pub mod record;
pub mod segment;
pub mod store;
