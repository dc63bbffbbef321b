use crate::config::Config;
use crate::error::{LogError, Result};
use crate::storage::mmap::MmapRegion;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Width of the relative offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// An Index maps relative offsets to byte positions in a segment's store.
///
/// ## On-disk format:
/// File name: `<base_offset>.index`
///
/// Each entry is exactly 12 bytes, big-endian:
/// ```text
/// | relative offset: u32 | position: u64 |
/// | 4 bytes              | 8 bytes       |
/// ```
///
/// Entries are dense: entry `i` lives at byte `i * 12` and holds relative
/// offset `i`. There is no header.
///
/// ## Sizing:
/// While open, the file is extended to at least the configured capacity so
/// the whole map is backed by the file. `size` tracks the bytes of valid entries; a
/// clean `close` truncates the file back to `size`.
///
/// ## Ownership:
/// - Index owns the file and the map exclusively
/// - `write` requires `&mut self`: one writer per Index
/// - `read` takes `&self` and may run from several readers at once
pub struct Index {
    /// File handle for the `.index` file.
    /// Opened read/write; sized to the mapped length while open.
    file: File,

    /// Path of the `.index` file, kept for removal.
    path: PathBuf,

    /// Shared mapping over the whole file.
    /// May be longer than `limit` when an unclean shutdown left the file
    /// at a larger, older capacity.
    mmap: MmapRegion,

    /// Bytes of valid entries. Always a multiple of `ENTRY_WIDTH`.
    size: u64,

    /// Bytes `write` may fill: the configured capacity, or the valid
    /// entries found at open if those already exceed it.
    limit: u64,
}

impl Index {
    /// Open or create an index file and map it.
    ///
    /// Existing entries are kept. A file left at full capacity by an
    /// unclean shutdown has its zeroed tail trimmed: slot `i` must hold
    /// relative offset `i`, so trailing slots that do not are discarded.
    ///
    /// Slot 0 of a zeroed file reads as `(0, 0)`, which is also a valid
    /// first entry, so trimming always keeps it. The index cannot tell the
    /// two apart on its own; `Segment::new` drops it when the store holds
    /// no complete record at position 0.
    ///
    /// The write limit is the configured capacity, or the trimmed entry
    /// count if that is already larger. A file left at an older, larger
    /// capacity is mapped whole but never written past the limit.
    ///
    /// # Arguments
    /// - `path`: Path to the `.index` file (e.g., "0.index")
    /// - `config`: Supplies `max_index_bytes`
    ///
    /// # Errors
    /// - I/O errors opening, resizing or mapping the file
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len % ENTRY_WIDTH != 0 {
            tracing::warn!(
                path = %path.display(),
                len,
                "index size not a multiple of entry width, ignoring partial entry"
            );
        }
        let existing = len - len % ENTRY_WIDTH;

        // Never shrink below what is already written.
        let capacity = config.segment.max_index_bytes.max(existing);
        file.set_len(capacity)?;

        let mmap = MmapRegion::map_shared(&file)?;

        let mut index = Index {
            file,
            path: path.to_path_buf(),
            mmap,
            size: existing,
            limit: capacity,
        };
        index.trim_torn_tail();
        index.limit = config.segment.max_index_bytes.max(index.size);

        Ok(index)
    }

    /// Drop trailing entries whose relative offset does not match their slot.
    fn trim_torn_tail(&mut self) {
        let before = self.size;

        while self.size >= 2 * ENTRY_WIDTH {
            let slot = self.size / ENTRY_WIDTH - 1;
            match self.entry_at(slot) {
                Some((off, _)) if u64::from(off) == slot => break,
                _ => self.size -= ENTRY_WIDTH,
            }
        }

        if self.size != before {
            tracing::warn!(
                path = %self.path.display(),
                kept = self.size / ENTRY_WIDTH,
                dropped = (before - self.size) / ENTRY_WIDTH,
                "trimmed torn index entries"
            );
        }
    }

    fn entry_at(&self, slot: u64) -> Option<(u32, u64)> {
        let pos = usize::try_from(slot.checked_mul(ENTRY_WIDTH)?).ok()?;
        let bytes = self.mmap.read_at(pos, ENTRY_WIDTH as usize)?;

        let (off, position) = bytes.split_at(OFFSET_WIDTH as usize);
        let off = u32::from_be_bytes(off.try_into().ok()?);
        let position = u64::from_be_bytes(position.try_into().ok()?);
        Some((off, position))
    }

    /// Read entry `entry`, or the last entry when `entry == -1`.
    ///
    /// # Returns
    /// `(relative_offset, position)`
    ///
    /// # Errors
    /// - `EndOfData` if the index is empty, `entry` is negative (other than
    ///   -1), or the entry lies beyond what has been written
    pub fn read(&self, entry: i64) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(LogError::EndOfData);
        }

        let slot = if entry == -1 {
            self.entries() - 1
        } else {
            u64::try_from(entry).map_err(|_| LogError::EndOfData)?
        };

        let end = slot
            .checked_add(1)
            .and_then(|n| n.checked_mul(ENTRY_WIDTH))
            .ok_or(LogError::EndOfData)?;
        if end > self.size {
            return Err(LogError::EndOfData);
        }

        self.entry_at(slot).ok_or(LogError::EndOfData)
    }

    /// Append an entry.
    ///
    /// # Errors
    /// - `IndexFull` if another 12 bytes would pass the write limit. This is
    ///   the signal for the owning log to rotate.
    pub fn write(&mut self, off: u32, position: u64) -> Result<()> {
        let capacity = self.limit;
        if self.size + ENTRY_WIDTH > capacity {
            return Err(LogError::IndexFull { capacity });
        }

        let mut entry = [0u8; ENTRY_WIDTH as usize];
        entry[..OFFSET_WIDTH as usize].copy_from_slice(&off.to_be_bytes());
        entry[OFFSET_WIDTH as usize..].copy_from_slice(&position.to_be_bytes());

        let pos = usize::try_from(self.size).map_err(|_| LogError::IndexFull { capacity })?;
        self.mmap.write_at(pos, &entry)?;

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Keep only the first `entries` entries.
    ///
    /// Used by segment recovery to drop entries that point past the store.
    pub(crate) fn truncate_entries(&mut self, entries: u64) {
        self.size = self.size.min(entries.saturating_mul(ENTRY_WIDTH));
    }

    /// Flush the map, sync the file, shrink it to `size`, and close it.
    ///
    /// The order is fixed: dirty pages reach the file before it is synced,
    /// and the map is gone before the file shrinks underneath it.
    pub fn close(self) -> Result<()> {
        let Index {
            file, mmap, size, ..
        } = self;

        mmap.flush()?;
        file.sync_all()?;
        drop(mmap);

        file.set_len(size)?;
        file.sync_all()?;
        Ok(())
    }

    /// Path of the `.index` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of valid entries.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of valid entries.
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Bytes `write` may fill before returning `IndexFull`.
    pub fn capacity(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: create a temp directory for tests
    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("failed to create temp dir")
    }

    fn config(max_index_bytes: u64) -> Config {
        Config::new(1024, max_index_bytes)
    }

    #[test]
    fn test_index_open_new() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        let index = Index::open(&index_path, &config(1024 * ENTRY_WIDTH)).expect("failed to open index");

        assert_eq!(index.size(), 0);
        assert_eq!(index.entries(), 0);
        assert_eq!(index.capacity(), 1024 * ENTRY_WIDTH);
        assert_eq!(index.path(), index_path.as_path());

        // Pre-extended to capacity while open
        let on_disk = fs::metadata(&index_path).expect("failed to get metadata").len();
        assert_eq!(on_disk, 1024 * ENTRY_WIDTH);
    }

    #[test]
    fn test_read_empty_index_is_end_of_data() {
        let dir = temp_dir();
        let index = Index::open(dir.path().join("0.index"), &config(120)).expect("failed to open index");

        assert!(index.read(-1).unwrap_err().is_end_of_data());
        assert!(index.read(0).unwrap_err().is_end_of_data());
    }

    #[test]
    fn test_write_and_read_entries() {
        let dir = temp_dir();
        let mut index = Index::open(dir.path().join("0.index"), &config(120)).expect("failed to open index");

        let entries = vec![(0u32, 0u64), (1, 10), (2, 25)];
        for (off, pos) in &entries {
            index.write(*off, *pos).expect("failed to write");
        }

        for (i, (off, pos)) in entries.iter().enumerate() {
            assert_eq!(index.read(i as i64).expect("read failed"), (*off, *pos));
        }
        assert_eq!(index.read(-1).expect("read failed"), (2, 25));
        assert_eq!(index.size(), 3 * ENTRY_WIDTH);
    }

    #[test]
    fn test_read_past_written_entries_is_end_of_data() {
        let dir = temp_dir();
        let mut index = Index::open(dir.path().join("0.index"), &config(120)).expect("failed to open index");
        index.write(0, 0).expect("failed to write");

        // Mapped region is larger, but only one entry was written
        assert!(index.read(1).unwrap_err().is_end_of_data());
        assert!(index.read(9).unwrap_err().is_end_of_data());
        assert!(index.read(-2).unwrap_err().is_end_of_data());
    }

    #[test]
    fn test_write_past_capacity_is_index_full() {
        let dir = temp_dir();
        let mut index = Index::open(dir.path().join("0.index"), &config(3 * ENTRY_WIDTH)).expect("failed to open index");

        for i in 0..3u32 {
            index.write(i, u64::from(i) * 20).expect("failed to write");
        }

        let err = index.write(3, 60).unwrap_err();
        assert!(err.is_index_full());
        assert_eq!(index.entries(), 3);
    }

    #[test]
    fn test_close_truncates_to_size_and_keeps_format() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        let mut index = Index::open(&index_path, &config(120)).expect("failed to open index");
        index.write(0, 0).expect("failed to write");
        index.write(1, 1500).expect("failed to write");
        index.close().expect("failed to close");

        let bytes = fs::read(&index_path).expect("failed to read file");
        assert_eq!(bytes.len(), 24);

        assert_eq!(&bytes[0..4], &0u32.to_be_bytes());
        assert_eq!(&bytes[4..12], &0u64.to_be_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_be_bytes());
        assert_eq!(&bytes[16..24], &1500u64.to_be_bytes());
    }

    #[test]
    fn test_reopen_existing_index() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        {
            let mut index = Index::open(&index_path, &config(120)).expect("failed to open index");
            index.write(0, 0).expect("failed to write");
            index.write(1, 1500).expect("failed to write");
            index.close().expect("failed to close");
        }

        let index = Index::open(&index_path, &config(120)).expect("failed to reopen index");
        assert_eq!(index.entries(), 2);
        assert_eq!(index.read(-1).expect("read failed"), (1, 1500));
        assert_eq!(index.read(0).expect("read failed"), (0, 0));
    }

    #[test]
    fn test_reopen_after_unclean_shutdown_trims_zeroed_tail() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        {
            let mut index = Index::open(&index_path, &config(120)).expect("failed to open index");
            index.write(0, 0).expect("failed to write");
            index.write(1, 30).expect("failed to write");
            index.write(2, 70).expect("failed to write");
            // Dropped without close: file stays at full capacity
        }
        assert_eq!(fs::metadata(&index_path).expect("failed to get metadata").len(), 120);

        let index = Index::open(&index_path, &config(120)).expect("failed to reopen index");
        assert_eq!(index.entries(), 3);
        assert_eq!(index.read(-1).expect("read failed"), (2, 70));
    }

    #[test]
    fn test_reopen_unclean_with_smaller_capacity_enforces_new_limit() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        {
            let mut index = Index::open(&index_path, &config(10 * ENTRY_WIDTH)).expect("failed to open index");
            index.write(0, 0).expect("failed to write");
            // Dropped without close: file stays at 10 entries
        }

        let mut index = Index::open(&index_path, &config(2 * ENTRY_WIDTH)).expect("failed to reopen index");
        assert_eq!(index.entries(), 1);
        assert_eq!(index.capacity(), 2 * ENTRY_WIDTH);

        index.write(1, 10).expect("failed to write");
        let err = index.write(2, 20).unwrap_err();
        assert!(err.is_index_full());
        assert_eq!(index.entries(), 2);
    }

    #[test]
    fn test_zeroed_index_keeps_slot_zero() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        {
            let _index = Index::open(&index_path, &config(120)).expect("failed to open index");
        }

        // Slot 0 is indistinguishable from a real (0, 0) entry
        let index = Index::open(&index_path, &config(120)).expect("failed to reopen index");
        assert_eq!(index.entries(), 1);
        assert_eq!(index.read(-1).expect("read failed"), (0, 0));
    }

    #[test]
    fn test_existing_entries_beyond_capacity_are_kept() {
        let dir = temp_dir();
        let index_path = dir.path().join("0.index");

        {
            let mut index = Index::open(&index_path, &config(120)).expect("failed to open index");
            for i in 0..5u32 {
                index.write(i, u64::from(i)).expect("failed to write");
            }
            index.close().expect("failed to close");
        }

        let mut index = Index::open(&index_path, &config(2 * ENTRY_WIDTH)).expect("failed to reopen index");
        assert_eq!(index.entries(), 5);
        assert_eq!(index.read(4).expect("read failed"), (4, 4));
        assert!(index.write(5, 5).unwrap_err().is_index_full());
    }
}
