use crate::error::{LogError, Result};
use std::fs::File;

/// A shared, writable memory-mapped region of a file.
///
/// # Purpose
/// Backing memory for the offset index. Writes land in the page cache and
/// reach the file on `flush()` or when the kernel writes the pages back.
///
/// # Access
/// The raw map never leaves this type. Callers go through `read_at` and
/// `write_at`, both bounds-checked against the mapped length, so an index
/// bug surfaces as `None` or an error instead of an out-of-bounds access.
///
/// # Lifetime Rules
/// - The file must not shrink while the region exists
/// - The region must be dropped before the file is truncated
///
/// # Thread Safety
/// Mutation requires `&mut self`, so there is one writer per region.
#[derive(Debug)]
pub struct MmapRegion {
    mmap: memmap2::MmapMut,
}

impl MmapRegion {
    /// Map the whole of `file` read/write and shared.
    ///
    /// The file must be opened with read and write access and already be
    /// sized to the capacity the caller needs.
    ///
    /// # Errors
    /// - File has zero length
    /// - OS mmap call fails (permissions, limits, etc.)
    pub fn map_shared(file: &File) -> Result<Self> {
        let len = file.metadata()?.len();

        if len == 0 {
            return Err(LogError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot mmap empty file",
            )));
        }

        // SAFETY: the region is owned by the index that owns `file`. The index
        // only shrinks the file after dropping this region, and no other
        // handle in the process truncates it while mapped.
        let mmap = unsafe { memmap2::MmapMut::map_mut(file)? };

        Ok(MmapRegion { mmap })
    }

    /// Borrow `len` bytes starting at `pos`, or `None` if out of bounds.
    pub fn read_at(&self, pos: usize, len: usize) -> Option<&[u8]> {
        let end = pos.checked_add(len)?;
        self.mmap.get(pos..end)
    }

    /// Copy `bytes` into the region at `pos`.
    ///
    /// # Errors
    /// - `IndexFull` if the write would run past the mapped length
    pub fn write_at(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let capacity = self.mmap.len() as u64;
        let dst = pos
            .checked_add(bytes.len())
            .and_then(|end| self.mmap.get_mut(pos..end))
            .ok_or(LogError::IndexFull { capacity })?;

        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Synchronously write dirty pages back to the file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
