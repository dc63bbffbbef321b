use crate::error::{LogError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Width of the length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

/// A Store is the append-only file holding a segment's record bytes.
///
/// ## On-disk format:
/// File name: `<base_offset>.store`
///
/// Each record:
/// ```text
/// | length: u64 (big-endian) | payload: [u8; length] |
/// ```
///
/// No header, no footer, no checksum. Positions handed out by `append`
/// point at the length prefix.
///
/// ## Buffering:
/// Appends go through a `BufWriter`. `read` flushes it first, so a read
/// never misses an append that returned before it.
///
/// ## Size:
/// The size counter is the logical end of the store: bytes already in the
/// file plus bytes still in the buffer. `Segment::is_maxed` compares this
/// logical size, not the flushed size, against the store limit. Positions
/// are taken from the same counter, so it must match where the next byte
/// will land; after a failed append it is recomputed from the file length
/// and the buffer.
///
/// ## Thread safety:
/// The writer and the size counter sit behind one mutex. `append` and
/// `read` both take it, so a `Store` can be shared across threads.
pub struct Store {
    /// Path of the `.store` file, kept for removal.
    path: PathBuf,

    /// Writer and size counter, locked together.
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    /// Buffered writer over the file, opened in append + read mode.
    /// Reads flush it and then seek the same handle; appends always land
    /// at the end regardless of the cursor.
    writer: BufWriter<File>,

    /// Logical end of the file: bytes on disk plus bytes still buffered.
    /// Next append's position.
    size: u64,
}

impl StoreInner {
    /// Recompute `size` from the file length and the buffered bytes.
    ///
    /// Called after a failed write: whatever part of the record reached the
    /// buffer or the file now sits before the next record's position.
    fn resync_size(&mut self) {
        match self.writer.get_ref().metadata() {
            Ok(meta) => self.size = meta.len() + self.writer.buffer().len() as u64,
            Err(e) => tracing::warn!(error = %e, "failed to resync store size"),
        }
    }

    /// Flush, then read the length prefix at `position`.
    ///
    /// # Returns
    /// The payload length, already checked to fit inside the store.
    fn read_len(&mut self, position: u64) -> Result<u64> {
        self.writer.flush()?;

        let size = self.size;
        if position.saturating_add(LEN_WIDTH) > size {
            return Err(unexpected_eof(position, size));
        }

        let file = self.writer.get_mut();
        file.seek(SeekFrom::Start(position))?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        // Check before allocating: a corrupt prefix must not size the buffer.
        if len > size - position - LEN_WIDTH {
            return Err(unexpected_eof(position, size));
        }
        Ok(len)
    }
}

impl Store {
    /// Open or create a store file in append mode.
    ///
    /// The size counter starts at the file's current length, so a reopened
    /// store keeps appending after the last record.
    ///
    /// # Arguments
    /// - `path`: Path to the `.store` file (e.g., "0.store")
    ///
    /// # Errors
    /// - I/O errors opening or creating the file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Store {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                size,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| LogError::LockPoisoned)
    }

    /// Append one record.
    ///
    /// Prefix and payload go to the writer in a single `write_all`.
    ///
    /// # Arguments
    /// - `payload`: Encoded record bytes
    ///
    /// # Returns
    /// `(bytes_written, position)` where `bytes_written` includes the 8-byte
    /// prefix and `position` is where the prefix starts.
    ///
    /// # Errors
    /// - I/O errors writing to the buffer or the file. The size counter is
    ///   resynced to the real end so the next append's position is correct.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.lock()?;

        let written = LEN_WIDTH + payload.len() as u64;
        let mut frame = Vec::with_capacity(written as usize);
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        frame.extend_from_slice(payload);

        let position = inner.size;
        if let Err(e) = inner.writer.write_all(&frame) {
            inner.resync_size();
            return Err(e.into());
        }

        inner.size += written;
        Ok((written, position))
    }

    /// Read the record whose length prefix starts at `position`.
    ///
    /// # Errors
    /// - I/O error of kind `UnexpectedEof` if the prefix or payload would run
    ///   past the end of the store
    /// - Other I/O errors from flush, seek or read
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.lock()?;
        let len = inner.read_len(position)?;

        let mut payload = vec![0u8; len as usize];
        inner.writer.get_mut().read_exact(&mut payload)?;
        Ok(payload)
    }

    /// End position of the record starting at `position`, if it is whole.
    ///
    /// Used by recovery to tell a complete record from one cut short by a
    /// crash.
    ///
    /// # Returns
    /// - `Some(end)`: prefix and payload both lie inside the store
    /// - `None`: the prefix or the payload runs past the end
    ///
    /// # Errors
    /// - I/O errors other than running past the end
    pub fn record_end(&self, position: u64) -> Result<Option<u64>> {
        let mut inner = self.lock()?;
        match inner.read_len(position) {
            Ok(len) => Ok(Some(position + LEN_WIDTH + len)),
            Err(LogError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Push buffered bytes to the file.
    pub fn flush(&self) -> Result<()> {
        self.lock()?.writer.flush()?;
        Ok(())
    }

    /// Flush buffered bytes, sync, and close the file.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner().map_err(|_| LogError::LockPoisoned)?;

        let file = inner
            .writer
            .into_inner()
            .map_err(|e| LogError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    /// Logical size in bytes, including bytes not yet flushed.
    ///
    /// This is what `Segment::is_maxed` compares against the store limit.
    pub fn size(&self) -> Result<u64> {
        Ok(self.lock()?.size)
    }

    /// Path of the `.store` file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn unexpected_eof(position: u64, size: u64) -> LogError {
    LogError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("record at position {} runs past store size {}", position, size),
    ))
}
