/// Errors produced by the storage core.
///
/// `EndOfData` and `IndexFull` are expected conditions: the first means
/// "nothing committed there", the second tells the owning log to rotate.
/// Everything else is a genuine failure.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("end of data")]
    EndOfData,

    #[error("index full: capacity {capacity} bytes")]
    IndexFull { capacity: u64 },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("offset {offset} does not fit a 32-bit relative offset from base {base}")]
    OffsetOverflow { offset: u64, base: u64 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl LogError {
    /// True when the requested entry or byte range has not been committed.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, LogError::EndOfData)
    }

    /// True when the index has no room for another entry.
    pub fn is_index_full(&self) -> bool {
        matches!(self, LogError::IndexFull { .. })
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
