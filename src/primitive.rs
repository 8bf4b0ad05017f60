//! Fixed-width integer and byte-run access at an explicit offset.
//!
//! Every read takes `(buf, offset)` and returns the decoded value together
//! with the offset just past it, so callers thread the cursor themselves and
//! never hold a stateful reader.  All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// A read would run past the end of the buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("read of {needed} byte(s) at offset {offset} exceeds buffer length {available}")]
pub struct OutOfBounds {
    pub offset:    usize,
    pub needed:    usize,
    pub available: usize,
}

#[inline]
fn span(buf: &[u8], offset: usize, n: usize) -> Result<&[u8], OutOfBounds> {
    let end = offset.checked_add(n).filter(|&end| end <= buf.len());
    match end {
        Some(end) => Ok(&buf[offset..end]),
        None => Err(OutOfBounds { offset, needed: n, available: buf.len() }),
    }
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(u8, usize), OutOfBounds> {
    let b = span(buf, offset, 1)?;
    Ok((b[0], offset + 1))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<(u32, usize), OutOfBounds> {
    let b = span(buf, offset, 4)?;
    Ok((LittleEndian::read_u32(b), offset + 4))
}

/// Borrow `n` bytes starting at `offset`.  No copy is made.
pub fn read_bytes(buf: &[u8], offset: usize, n: usize) -> Result<(&[u8], usize), OutOfBounds> {
    let b = span(buf, offset, n)?;
    Ok((b, offset + n))
}

pub fn write_u8(sink: &mut Vec<u8>, value: u8) {
    sink.push(value);
}

pub fn write_u32(sink: &mut Vec<u8>, value: u32) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, value);
    sink.extend_from_slice(&b);
}

pub fn write_bytes(sink: &mut Vec<u8>, bytes: &[u8]) {
    sink.extend_from_slice(bytes);
}
