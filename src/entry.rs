//! Entry codec: one `(key, type, payload)` record on the wire.
//!
//! # Layout
//!
//! ```text
//! [key_len: u8][key: key_len bytes][type: u8][payload_len: u32 LE][payload]
//! ```
//!
//! An entry is irreducible: reading `payload_len` bytes past the payload
//! start lands exactly on the next entry's `key_len` byte, or on the end of
//! the buffer.  There is no other framing.

use std::fmt;
use std::str;

use serde::Serialize;
use thiserror::Error;

use crate::primitive::{read_bytes, read_u32, read_u8, write_bytes, write_u32, write_u8, OutOfBounds};

/// Largest key the one-byte length prefix can describe.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// Bytes of framing around every entry, excluding key and payload.
pub const ENTRY_OVERHEAD: usize = 1 + 1 + 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("malformed stream: {0}")]
    Truncated(#[from] OutOfBounds),
    #[error("malformed stream: unknown entry type {tag} at offset {offset}")]
    UnknownType { tag: u8, offset: usize },
    #[error("malformed stream: key at offset {offset} is not valid UTF-8")]
    InvalidKey { offset: usize },
    #[error("key is {0} bytes; the format allows at most {max}", max = MAX_KEY_LEN)]
    KeyTooLong(usize),
    #[error("payload is {0} bytes; the format allows at most {max}", max = u32::MAX)]
    PayloadTooLarge(usize),
}

impl EntryError {
    /// True for errors raised while reading a stream, as opposed to
    /// precondition failures on the encoding side.
    pub fn is_malformed_stream(&self) -> bool {
        matches!(
            self,
            EntryError::Truncated(_) | EntryError::UnknownType { .. } | EntryError::InvalidKey { .. }
        )
    }
}

/// Payload interpretation tag.  Values are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EntryType {
    /// UTF-8 JSON text.
    Json   = 0,
    /// Raw bytes.
    Binary = 1,
}

impl EntryType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryType::Json),
            1 => Some(EntryType::Binary),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntryType::Json   => "json",
            EntryType::Binary => "binary",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A borrowed view of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key:     &'a str,
    pub kind:    EntryType,
    pub payload: &'a [u8],
}

impl<'a> Entry<'a> {
    pub fn new(key: &'a str, kind: EntryType, payload: &'a [u8]) -> Self {
        Self { key, kind, payload }
    }

    /// Total bytes this entry occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        ENTRY_OVERHEAD + self.key.len() + self.payload.len()
    }

    /// Check the format limits without writing anything.
    pub fn validate(&self) -> Result<(), EntryError> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(EntryError::KeyTooLong(self.key.len()));
        }
        if u32::try_from(self.payload.len()).is_err() {
            return Err(EntryError::PayloadTooLarge(self.payload.len()));
        }
        Ok(())
    }

    /// Append the entry to `sink`.  On error `sink` is left untouched.
    pub fn encode_into(&self, sink: &mut Vec<u8>) -> Result<(), EntryError> {
        self.validate()?;
        sink.reserve(self.encoded_len());
        write_u8(sink, self.key.len() as u8);
        write_bytes(sink, self.key.as_bytes());
        write_u8(sink, self.kind as u8);
        write_u32(sink, self.payload.len() as u32);
        write_bytes(sink, self.payload);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, EntryError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode the entry starting at `offset`.  Returns the entry and the
    /// offset of whatever follows it.
    pub fn decode(buf: &'a [u8], offset: usize) -> Result<(Self, usize), EntryError> {
        let (key_len, off) = read_u8(buf, offset)?;
        let (key_bytes, off) = read_bytes(buf, off, key_len as usize)?;
        let key = str::from_utf8(key_bytes).map_err(|_| EntryError::InvalidKey { offset })?;

        let tag_offset = off;
        let (tag, off) = read_u8(buf, off)?;
        let kind = EntryType::from_tag(tag)
            .ok_or(EntryError::UnknownType { tag, offset: tag_offset })?;

        let (payload_len, off) = read_u32(buf, off)?;
        let (payload, next) = read_bytes(buf, off, payload_len as usize)?;
        Ok((Entry { key, kind, payload }, next))
    }
}

/// Convenience wrapper over [`Entry::encode`].
pub fn encode_entry(key: &str, kind: EntryType, payload: &[u8]) -> Result<Vec<u8>, EntryError> {
    Entry::new(key, kind, payload).encode()
}

/// Convenience wrapper over [`Entry::decode`].
pub fn decode_entry(buf: &[u8], offset: usize) -> Result<(Entry<'_>, usize), EntryError> {
    Entry::decode(buf, offset)
}

/// Walks the raw entries of a multipart buffer in wire order.
///
/// Yields each entry with the offset it started at.  After the first error
/// the iterator is fused and yields nothing further.
pub struct EntryIter<'a> {
    buf:    &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> EntryIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, failed: false }
    }

    /// Offset of the next entry to be read.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<(usize, Entry<'a>), EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let start = self.offset;
        match Entry::decode(self.buf, start) {
            Ok((entry, next)) => {
                self.offset = next;
                Some(Ok((start, entry)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_bit_exact() {
        let bytes = encode_entry("ab", EntryType::Binary, &[9, 8, 7]).unwrap();
        assert_eq!(bytes, [2, b'a', b'b', 1, 3, 0, 0, 0, 9, 8, 7]);
    }

    #[test]
    fn decode_lands_on_next_entry() {
        let mut buf = encode_entry("k", EntryType::Json, b"1").unwrap();
        let first_len = buf.len();
        buf.extend(encode_entry("z", EntryType::Binary, b"").unwrap());

        let (e, next) = decode_entry(&buf, 0).unwrap();
        assert_eq!(e, Entry::new("k", EntryType::Json, b"1"));
        assert_eq!(next, first_len);

        let (e, next) = decode_entry(&buf, next).unwrap();
        assert_eq!(e.key, "z");
        assert!(e.payload.is_empty());
        assert_eq!(next, buf.len());
    }

    #[test]
    fn key_of_255_bytes_is_allowed() {
        let key = "k".repeat(MAX_KEY_LEN);
        let bytes = encode_entry(&key, EntryType::Json, b"null").unwrap();
        let (e, _) = decode_entry(&bytes, 0).unwrap();
        assert_eq!(e.key, key);
    }

    #[test]
    fn long_key_fails_without_writing() {
        let key = "é".repeat(128); // 256 bytes
        let mut sink = vec![0xAA];
        let err = Entry::new(&key, EntryType::Json, b"1").encode_into(&mut sink).unwrap_err();
        assert_eq!(err, EntryError::KeyTooLong(256));
        assert!(!err.is_malformed_stream());
        assert_eq!(sink, [0xAA]);
    }

    #[test]
    fn unknown_type_is_malformed() {
        let mut bytes = encode_entry("k", EntryType::Json, b"1").unwrap();
        bytes[2] = 7;
        let err = decode_entry(&bytes, 0).unwrap_err();
        assert_eq!(err, EntryError::UnknownType { tag: 7, offset: 2 });
        assert!(err.is_malformed_stream());
    }

    #[test]
    fn non_utf8_key_is_malformed() {
        let bytes = [1u8, 0xFF, 0, 0, 0, 0, 0];
        assert_eq!(decode_entry(&bytes, 0).unwrap_err(), EntryError::InvalidKey { offset: 0 });
    }

    #[test]
    fn every_truncation_fails() {
        let bytes = encode_entry("key", EntryType::Binary, b"payload").unwrap();
        for cut in 1..bytes.len() {
            let err = decode_entry(&bytes[..cut], 0).unwrap_err();
            assert!(matches!(err, EntryError::Truncated(_)), "cut at {cut}: {err:?}");
        }
    }

    #[test]
    fn iterator_fuses_after_error() {
        let mut buf = encode_entry("a", EntryType::Json, b"1").unwrap();
        buf.push(4); // key_len with nothing after it
        let mut it = EntryIter::new(&buf);
        assert_eq!(it.next().unwrap().unwrap().0, 0);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }
}
