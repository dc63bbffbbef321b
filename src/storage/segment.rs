use crate::config::Config;
use crate::error::{LogError, Result};
use crate::storage::index::Index;
use crate::storage::record::LogRecord;
use crate::storage::store::Store;
use std::fs;
use std::path::{Path, PathBuf};

const STORE_EXT: &str = "store";
const INDEX_EXT: &str = "index";

/// File name of the store for a segment starting at `base_offset`.
pub fn store_file_name(base_offset: u64) -> String {
    format!("{}.{}", base_offset, STORE_EXT)
}

/// File name of the index for a segment starting at `base_offset`.
pub fn index_file_name(base_offset: u64) -> String {
    format!("{}.{}", base_offset, INDEX_EXT)
}

/// Parse the base offset out of a `{base}.store` or `{base}.index` path.
///
/// Returns `None` for any other file, including zero-padded names.
pub fn parse_base_offset(path: impl AsRef<Path>) -> Option<u64> {
    let path = path.as_ref();
    let ext = path.extension()?.to_str()?;
    if ext != STORE_EXT && ext != INDEX_EXT {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    if stem.len() > 1 && stem.starts_with('0') {
        return None;
    }
    stem.parse().ok()
}

/// Round `value` down to the nearest multiple of `multiple`.
///
/// Used by the owning log to align truncation boundaries to base offsets.
/// A `multiple` of zero returns `value` unchanged.
pub fn nearest_multiple(value: u64, multiple: u64) -> u64 {
    if multiple == 0 {
        return value;
    }
    (value / multiple) * multiple
}

/// A Segment is one offset-contiguous shard of the log.
///
/// Responsibilities:
/// - Own one `.store` and one `.index` file
/// - Assign monotonically increasing absolute offsets
/// - Translate absolute offsets to store positions through the index
/// - Report when either file reaches its configured limit
///
/// NOT responsible for:
/// - Choosing the active segment or rotating (owning log)
/// - Retention policy (owning log calls `remove`)
///
/// ## Offsets:
/// The segment covers `[base_offset, next_offset)`. Index entries are keyed
/// by `offset - base_offset`, which must fit in a `u32`.
///
/// ## Recovery:
/// `next_offset` is derived from the index alone when the segment opens.
/// The index is the source of truth; store bytes past the last index entry
/// are unreachable.
///
/// ## Thread safety:
/// - `append` requires `&mut self`: one appender per segment
/// - `read` takes `&self`
pub struct Segment {
    /// Record bytes for this segment's offsets.
    /// Ownership: Segment exclusively owns the Store.
    store: Store,

    /// Relative offset → store position for every record in the store.
    /// Ownership: Segment exclusively owns the Index.
    index: Index,

    /// Base offset: the absolute offset of index entry 0.
    /// This is encoded in both file names and never changes.
    base_offset: u64,

    /// Next offset: the absolute offset the next append will get.
    /// Starts at base_offset (or the recovered value), increments by 1 per
    /// successful append.
    next_offset: u64,

    /// Size limits checked by `is_maxed`.
    config: Config,
}

impl Segment {
    /// Open or create the segment starting at `base_offset` under `dir`.
    ///
    /// Existing files are reopened. Trailing index entries whose record is
    /// not whole in the store are dropped (the index reached disk, some or
    /// all of the store bytes did not), then `next_offset` is set from the
    /// last remaining entry, or to `base_offset` if there is none.
    ///
    /// # Arguments
    /// - `dir`: Directory holding the log's segment files
    /// - `base_offset`: Absolute offset of the segment's first record
    /// - `config`: Store and index limits
    ///
    /// # Errors
    /// - `InvalidConfig` if the limits are unusable
    /// - I/O errors opening, sizing or mapping either file. Whatever was
    ///   already opened is closed again before returning.
    pub fn new(dir: impl AsRef<Path>, base_offset: u64, config: &Config) -> Result<Self> {
        config.validate()?;

        let dir = dir.as_ref();
        let store = Store::open(dir.join(store_file_name(base_offset)))?;
        let mut index = Index::open(dir.join(index_file_name(base_offset)), config)?;

        let store_size = store.size()?;
        let mut valid = index.entries();
        while valid > 0 {
            let (_, position) = index.read((valid - 1) as i64)?;
            if store.record_end(position)?.is_some() {
                break;
            }
            valid -= 1;
        }
        if valid < index.entries() {
            tracing::warn!(
                base_offset,
                store_size,
                dropped = index.entries() - valid,
                "index entries point at incomplete store records, dropping"
            );
            index.truncate_entries(valid);
        }

        let next_offset = match index.read(-1) {
            Ok((off, _)) => base_offset + u64::from(off) + 1,
            Err(LogError::EndOfData) => base_offset,
            Err(e) => return Err(e),
        };

        tracing::debug!(base_offset, next_offset, dir = %dir.display(), "segment opened");

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config: config.clone(),
        })
    }

    /// Append a record and return its absolute offset.
    ///
    /// The record's offset field is stamped with the assigned offset before
    /// it is encoded; the caller's record carries it afterwards.
    ///
    /// `next_offset` only advances once both the store append and the index
    /// write succeed. On failure the files may hold the partial write, but
    /// reopening re-derives `next_offset` from the index.
    ///
    /// # Errors
    /// - `OffsetOverflow` if the relative offset no longer fits in a `u32`
    /// - `Encode` if the record fails to encode
    /// - `IndexFull` when the index has no room; time to rotate
    /// - I/O errors from the store
    pub fn append<R: LogRecord>(&mut self, record: &mut R) -> Result<u64> {
        let cur = self.next_offset;
        let relative = u32::try_from(cur - self.base_offset).map_err(|_| LogError::OffsetOverflow {
            offset: cur,
            base: self.base_offset,
        })?;

        record.set_offset(cur);
        let bytes = record.encode()?;

        let (_, position) = self.store.append(&bytes)?;
        self.index.write(relative, position)?;

        self.next_offset += 1;
        Ok(cur)
    }

    /// Read the record at absolute offset `off`.
    ///
    /// # Errors
    /// - `EndOfData` if `off` is outside `[base_offset, next_offset)`
    /// - `Decode` if the stored bytes are not a valid record
    /// - I/O errors from the store
    pub fn read<R: LogRecord>(&self, off: u64) -> Result<R> {
        if !self.contains(off) {
            return Err(LogError::EndOfData);
        }

        let (_, position) = self.index.read((off - self.base_offset) as i64)?;
        let bytes = self.store.read(position)?;
        R::decode(&bytes)
    }

    /// True once the store or the index has reached its configured limit.
    ///
    /// Polled by the owning log after each append to decide on rotation.
    pub fn is_maxed(&self) -> bool {
        let store_size = match self.store.size() {
            Ok(size) => size,
            // A poisoned store accepts no further appends.
            Err(_) => return true,
        };
        store_size >= self.config.segment.max_store_bytes
            || self.index.size() >= self.config.segment.max_index_bytes
    }

    /// Push buffered store bytes to the file without closing.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Close the index, then the store.
    ///
    /// Both are closed even if the first fails; the first error is returned.
    pub fn close(self) -> Result<()> {
        self.close_files().map(|_| ())
    }

    fn close_files(self) -> Result<(PathBuf, PathBuf)> {
        let Segment {
            store,
            index,
            base_offset,
            next_offset,
            ..
        } = self;

        let index_path = index.path().to_path_buf();
        let store_path = store.path().to_path_buf();

        let index_result = index.close();
        let store_result = store.close();

        tracing::debug!(base_offset, next_offset, "segment closed");

        index_result?;
        store_result?;
        Ok((index_path, store_path))
    }

    /// Close the segment and delete its index and store files.
    ///
    /// Not atomic: if the index is deleted and the store deletion fails,
    /// the segment is left half removed and the error is returned.
    pub fn remove(self) -> Result<()> {
        let base_offset = self.base_offset;
        let (index_path, store_path) = self.close_files()?;

        fs::remove_file(&index_path)?;
        fs::remove_file(&store_path)?;

        tracing::debug!(base_offset, "segment removed");
        Ok(())
    }

    /// Whether `off` has been appended to this segment.
    ///
    /// # Returns
    /// True for `off` in `[base_offset, next_offset)`.
    pub fn contains(&self, off: u64) -> bool {
        off >= self.base_offset && off < self.next_offset
    }

    /// Get the base offset of this segment.
    ///
    /// Absolute offset of the first record; encoded in the file names.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Get the next offset that will be assigned.
    ///
    /// If no records have been appended, this equals base_offset.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Number of records in this segment.
    pub fn record_count(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    /// Logical store size in bytes.
    pub fn store_size(&self) -> Result<u64> {
        self.store.size()
    }

    /// Bytes of valid index entries.
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// Path of the `.store` file.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Path of the `.index` file.
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }
}
