use crate::error::{LogError, Result};
use crate::storage::index::ENTRY_WIDTH;

/// Default store capacity before a segment reports itself maxed: 1 MiB.
const DEFAULT_MAX_STORE_BYTES: u64 = 1024 * 1024;

/// Default index capacity, rounded down to whole entries.
const DEFAULT_MAX_INDEX_BYTES: u64 = (1024 * 1024 / ENTRY_WIDTH) * ENTRY_WIDTH;

/// Configuration handed down by the owning log.
///
/// Only the segment limits are interpreted by the storage core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Size limits for a single segment.
///
/// Both limits are rotation thresholds: once either is reached,
/// `Segment::is_maxed` returns true. The index limit is also the
/// size of the memory map, so it is a hard cap on entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size in bytes at which the segment counts as full.
    pub max_store_bytes: u64,

    /// Index capacity in bytes. Must be a whole number of 12-byte entries.
    pub max_index_bytes: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
        }
    }
}

impl Config {
    pub fn new(max_store_bytes: u64, max_index_bytes: u64) -> Self {
        Self {
            segment: SegmentConfig {
                max_store_bytes,
                max_index_bytes,
            },
        }
    }

    pub fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Reject limits that cannot produce a usable segment.
    ///
    /// # Errors
    /// - `max_store_bytes` is zero
    /// - `max_index_bytes` cannot hold one entry or is not a multiple of 12
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segment;

        if seg.max_store_bytes == 0 {
            return Err(LogError::InvalidConfig(
                "max_store_bytes must be greater than zero".to_string(),
            ));
        }

        if seg.max_index_bytes < ENTRY_WIDTH {
            return Err(LogError::InvalidConfig(format!(
                "max_index_bytes {} cannot hold a single {}-byte entry",
                seg.max_index_bytes, ENTRY_WIDTH
            )));
        }

        if seg.max_index_bytes % ENTRY_WIDTH != 0 {
            return Err(LogError::InvalidConfig(format!(
                "max_index_bytes {} is not a multiple of {}",
                seg.max_index_bytes, ENTRY_WIDTH
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.segment.max_index_bytes % ENTRY_WIDTH, 0);
    }

    #[test]
    fn test_builder_sets_limits() {
        let config = Config::default()
            .with_max_store_bytes(1024)
            .with_max_index_bytes(120);

        assert_eq!(config, Config::new(1024, 120));
    }

    #[test]
    fn test_zero_store_bytes_rejected() {
        let err = Config::new(0, 120).validate().unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig(_)));
    }

    #[test]
    fn test_index_smaller_than_entry_rejected() {
        let err = Config::new(1024, 11).validate().unwrap_err();
        assert!(err.to_string().contains("single"));
    }

    #[test]
    fn test_index_not_entry_aligned_rejected() {
        let err = Config::new(1024, 100).validate().unwrap_err();
        assert!(err.to_string().contains("multiple of 12"));
    }
}
