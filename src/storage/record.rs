use crate::error::{LogError, Result};
use prost::Message;

/// A record the segment can stamp, encode and decode.
///
/// The segment only needs the offset field and a byte encoding. Encoding
/// must be deterministic and depend on nothing outside the record; decoding
/// must fail on truncated or corrupt input rather than return a default.
pub trait LogRecord: Sized {
    fn offset(&self) -> u64;

    fn set_offset(&mut self, offset: u64);

    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// The default record: an opaque payload plus its log offset.
///
/// Encoded as a protocol buffers message so it matches the wire type the
/// serving layer exchanges with clients:
/// ```text
/// message Record {
///   bytes  value  = 1;
///   uint64 offset = 2;
/// }
/// ```
#[derive(Clone, PartialEq, Message)]
pub struct Record {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,

    #[prost(uint64, tag = "2")]
    pub offset: u64,
}

impl Record {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Record {
            value: value.into(),
            offset: 0,
        }
    }
}

impl LogRecord for Record {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.encode_to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        <Record as Message>::decode(bytes).map_err(|e| LogError::Decode(e.to_string()))
    }
}
